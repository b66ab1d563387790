//! Modem status tracking from unsolicited and solicited status lines.
//!
//! Lines of the ModemStatusLine category (`+CSQ`, `+CREG`, `+COPS`,
//! `+CPIN`, `+CGATT`, `+CFUN`) are parsed into one shared [`ModemStatus`].
//! The same parser is applied to command response text after a poll.

use std::sync::{Arc, Mutex, PoisonError};

use heapless::String as HString;
use log::{debug, info};
use serde::Serialize;

use crate::stream::frame::Frame;
use crate::stream::router::Handler;

pub const OPERATOR_CAP: usize = 32;

/// Network registration state reported by `+CREG`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum Registration {
    #[default]
    Unknown,
    NotRegistered,
    Home,
    Searching,
    Denied,
    Roaming,
}

impl Registration {
    fn from_stat(stat: u8) -> Self {
        match stat {
            0 => Self::NotRegistered,
            1 => Self::Home,
            2 => Self::Searching,
            3 => Self::Denied,
            5 => Self::Roaming,
            _ => Self::Unknown,
        }
    }

    pub fn is_registered(self) -> bool {
        matches!(self, Self::Home | Self::Roaming)
    }
}

/// Last known modem state.  `None` means "not reported yet".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ModemStatus {
    pub rssi_dbm: Option<i16>,
    pub registration: Registration,
    pub operator: Option<HString<OPERATOR_CAP>>,
    pub sim_ready: Option<bool>,
    pub attached: Option<bool>,
    pub functionality: Option<u8>,
}

/// What a single line changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusUpdate {
    Signal,
    Registration,
    Operator,
    Sim,
    Attach,
    Functionality,
}

#[derive(Clone, Default)]
pub struct ModemStatusTracker {
    status: Arc<Mutex<ModemStatus>>,
}

impl ModemStatusTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the current state.
    pub fn status(&self) -> ModemStatus {
        self.status
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Router handler for ModemStatusLine frames.
    pub fn handler(&self) -> Handler {
        let tracker = self.clone();
        Box::new(move |frame: Frame| {
            if let Some(line) = frame.as_str() {
                tracker.apply_line(line);
            }
        })
    }

    /// Parse one status line.  Unrecognised lines return `None`.
    pub fn apply_line(&self, line: &str) -> Option<StatusUpdate> {
        let line = line.trim();
        let mut status = self.status.lock().unwrap_or_else(PoisonError::into_inner);
        let update = parse_into(&mut status, line)?;
        debug!("MODEM | {:?} | {}", update, line);
        if update == StatusUpdate::Registration {
            info!("MODEM | registration={:?}", status.registration);
        }
        Some(update)
    }

    /// Apply every line of a command response.  Returns how many lines
    /// updated the state.
    pub fn apply_response(&self, text: &str) -> usize {
        text.lines()
            .filter(|l| self.apply_line(l).is_some())
            .count()
    }
}

fn parse_into(status: &mut ModemStatus, line: &str) -> Option<StatusUpdate> {
    let (key, value) = line.split_once(':')?;
    let value = value.trim();
    let mut fields = value.split(',').map(str::trim);
    match key.trim() {
        "+CSQ" => {
            let rssi: u8 = fields.next()?.parse().ok()?;
            status.rssi_dbm = rssi_to_dbm(rssi);
            Some(StatusUpdate::Signal)
        }
        "+CREG" => {
            // Solicited form is `n,stat[,...]`, URC form is `stat[,...]`.
            let first: u8 = fields.next()?.parse().ok()?;
            let stat = match fields.next().and_then(|f| f.parse::<u8>().ok()) {
                Some(stat) => stat,
                None => first,
            };
            status.registration = Registration::from_stat(stat);
            Some(StatusUpdate::Registration)
        }
        "+COPS" => {
            let start = value.find('"')?;
            let rest = &value[start + 1..];
            let end = rest.find('"')?;
            let mut name = HString::new();
            for c in rest[..end].chars() {
                if name.push(c).is_err() {
                    break;
                }
            }
            status.operator = Some(name);
            Some(StatusUpdate::Operator)
        }
        "+CPIN" => {
            status.sim_ready = Some(value == "READY");
            Some(StatusUpdate::Sim)
        }
        "+CGATT" => {
            let n: u8 = fields.next()?.parse().ok()?;
            status.attached = Some(n == 1);
            Some(StatusUpdate::Attach)
        }
        "+CFUN" => {
            status.functionality = Some(fields.next()?.parse().ok()?);
            Some(StatusUpdate::Functionality)
        }
        _ => None,
    }
}

/// `+CSQ` rssi index to dBm.  99 is "not known or not detectable".
pub fn rssi_to_dbm(rssi: u8) -> Option<i16> {
    match rssi {
        0..=31 => Some(-113 + 2 * i16::from(rssi)),
        _ => None,
    }
}
