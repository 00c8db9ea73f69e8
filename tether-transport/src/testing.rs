// ABOUTME: Scripted in-memory Transport for deterministic session tests.
// ABOUTME: A ScriptProbe pushes inbound events, fails opens on demand, and records what was sent.
//!
//! # Example
//!
//! ```no_run
//! use tether_transport::testing::scripted;
//! use tether_transport::Transport;
//!
//! # async fn example() {
//! let (mut transport, probe) = scripted();
//! probe.fail_next_open("connection refused");
//!
//! assert!(transport.open("ws://localhost/ws/s1").await.is_err());
//! transport.open("ws://localhost/ws/s1").await.unwrap();
//!
//! probe.push_text(r#"{"type":"text","data":{"content":"hi"}}"#);
//! let event = transport.recv().await;
//! assert!(event.is_some());
//! assert_eq!(probe.opens().len(), 2);
//! # }
//! ```

use crate::traits::{Transport, TransportEvent};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use tokio::time::Instant;

/// One call to `Transport::open` as seen by the script
#[derive(Debug, Clone)]
pub struct OpenRecord {
    pub url: String,
    /// Tokio clock reading when open was called (works with paused time)
    pub at: Instant,
    pub succeeded: bool,
}

#[derive(Default)]
struct Script {
    open_failures: VecDeque<String>,
    opens: Vec<OpenRecord>,
    sent: Vec<String>,
    closes: usize,
    fail_sends: bool,
}

/// Transport half handed to the code under test
pub struct ScriptedTransport {
    script: Arc<Mutex<Script>>,
    inbound: mpsc::UnboundedReceiver<TransportEvent>,
    open: bool,
}

/// Test half: drives and inspects a ScriptedTransport
#[derive(Clone)]
pub struct ScriptProbe {
    script: Arc<Mutex<Script>>,
    tx: mpsc::UnboundedSender<TransportEvent>,
}

/// Create a connected transport/probe pair
pub fn scripted() -> (ScriptedTransport, ScriptProbe) {
    let script = Arc::new(Mutex::new(Script::default()));
    let (tx, rx) = mpsc::unbounded_channel();
    (
        ScriptedTransport {
            script: Arc::clone(&script),
            inbound: rx,
            open: false,
        },
        ScriptProbe { script, tx },
    )
}

fn lock(script: &Mutex<Script>) -> MutexGuard<'_, Script> {
    script.lock().unwrap_or_else(|e| e.into_inner())
}

impl ScriptProbe {
    /// Queue one raw inbound text frame
    pub fn push_text(&self, text: &str) {
        let _ = self.tx.send(TransportEvent::Message(text.to_string()));
    }

    /// Queue a socket error
    pub fn push_error(&self, message: &str) {
        let _ = self.tx.send(TransportEvent::Error(message.to_string()));
    }

    /// Queue an unexpected close
    pub fn push_close(&self, reason: &str) {
        let _ = self.tx.send(TransportEvent::closed(reason));
    }

    /// Make the next `open` call fail with `reason`
    pub fn fail_next_open(&self, reason: &str) {
        lock(&self.script).open_failures.push_back(reason.to_string());
    }

    /// Make the next `count` open calls fail
    pub fn fail_opens(&self, count: usize) {
        let mut script = lock(&self.script);
        for i in 0..count {
            script
                .open_failures
                .push_back(format!("scripted open failure {}", i + 1));
        }
    }

    /// Make every subsequent `send` fail (or succeed again with `false`)
    pub fn fail_sends(&self, fail: bool) {
        lock(&self.script).fail_sends = fail;
    }

    /// All open attempts so far, in order
    pub fn opens(&self) -> Vec<OpenRecord> {
        lock(&self.script).opens.clone()
    }

    /// Every frame written through `send`, in order
    pub fn sent(&self) -> Vec<String> {
        lock(&self.script).sent.clone()
    }

    /// Number of explicit `close` calls on an open socket
    pub fn close_count(&self) -> usize {
        lock(&self.script).closes
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn open(&mut self, url: &str) -> Result<()> {
        let mut script = lock(&self.script);
        let failure = script.open_failures.pop_front();
        script.opens.push(OpenRecord {
            url: url.to_string(),
            at: Instant::now(),
            succeeded: failure.is_none(),
        });
        drop(script);

        match failure {
            Some(reason) => {
                self.open = false;
                anyhow::bail!("{}", reason)
            }
            None => {
                self.open = true;
                Ok(())
            }
        }
    }

    async fn send(&mut self, text: String) -> Result<()> {
        if !self.open {
            anyhow::bail!("Scripted transport is not open");
        }
        let mut script = lock(&self.script);
        if script.fail_sends {
            anyhow::bail!("Scripted send failure");
        }
        script.sent.push(text);
        Ok(())
    }

    async fn recv(&mut self) -> Option<TransportEvent> {
        if !self.open {
            return None;
        }
        let event = self.inbound.recv().await?;
        if matches!(event, TransportEvent::Closed { .. }) {
            self.open = false;
        }
        Some(event)
    }

    async fn close(&mut self) -> Result<()> {
        if self.open {
            self.open = false;
            lock(&self.script).closes += 1;
        }
        Ok(())
    }
}
