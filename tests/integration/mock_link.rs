//! Scripted SIM7670G stand-in for integration tests.
//!
//! [`MockModem`] is the transmit half of the link: it records every byte
//! the pipeline writes and, when a complete command line arrives, answers
//! with the scripted reply.  [`ModemRx`] is the receive half the harvester
//! drains.  [`ModemHandle`] lets a test inject unsolicited output (GNSS
//! sentences, URCs) and inspect the command history.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use trackmux::app::ports::{LinkRx, LinkTx};
use trackmux::error::LinkError;

#[derive(Default)]
struct Script {
    replies: HashMap<String, Vec<u8>>,
    commands: Vec<String>,
    line: Vec<u8>,
}

pub struct MockModem {
    script: Arc<Mutex<Script>>,
    out: Sender<Vec<u8>>,
}

pub struct ModemRx {
    input: Receiver<Vec<u8>>,
    pending: Vec<u8>,
}

#[derive(Clone)]
pub struct ModemHandle {
    script: Arc<Mutex<Script>>,
    out: Sender<Vec<u8>>,
}

/// Build a connected modem: (tx half, rx half, test handle).
pub fn mock_modem() -> (MockModem, ModemRx, ModemHandle) {
    let (out, input) = unbounded();
    let script = Arc::new(Mutex::new(Script::default()));
    (
        MockModem {
            script: Arc::clone(&script),
            out: out.clone(),
        },
        ModemRx {
            input,
            pending: Vec::new(),
        },
        ModemHandle { script, out },
    )
}

#[allow(dead_code)]
impl ModemHandle {
    /// Answer `command` with `reply` every time it is written.
    pub fn script(&self, command: &str, reply: &[u8]) {
        self.script
            .lock()
            .unwrap()
            .replies
            .insert(command.to_owned(), reply.to_vec());
    }

    /// Emit bytes as if the modem produced them unprompted.
    pub fn emit(&self, bytes: &[u8]) {
        self.out.send(bytes.to_vec()).unwrap();
    }

    /// Every command line written so far, terminator stripped.
    pub fn commands(&self) -> Vec<String> {
        self.script.lock().unwrap().commands.clone()
    }
}

impl LinkTx for MockModem {
    fn write(&mut self, data: &[u8]) -> Result<usize, LinkError> {
        let mut script = self.script.lock().unwrap();
        for &b in data {
            if b == b'\n' {
                let line = std::mem::take(&mut script.line);
                let command = String::from_utf8_lossy(&line).trim_end_matches('\r').to_owned();
                if let Some(reply) = script.replies.get(&command).cloned() {
                    self.out.send(reply).map_err(|_| LinkError::Closed)?;
                }
                script.commands.push(command);
            } else {
                script.line.push(b);
            }
        }
        Ok(data.len())
    }
}

impl LinkRx for ModemRx {
    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, LinkError> {
        if self.pending.is_empty() {
            match self.input.recv_timeout(timeout) {
                Ok(bytes) => self.pending = bytes,
                Err(RecvTimeoutError::Timeout) => return Ok(0),
                Err(RecvTimeoutError::Disconnected) => return Err(LinkError::Closed),
            }
        }
        let n = buf.len().min(self.pending.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.drain(..n);
        Ok(n)
    }
}

/// Transmit half that accepts and forgets everything.
pub struct SilentTx;

impl LinkTx for SilentTx {
    fn write(&mut self, data: &[u8]) -> Result<usize, LinkError> {
        Ok(data.len())
    }
}
