//! Content-based line classification.
//!
//! Stateless: the category depends only on the bytes of the line, never on
//! timing or on earlier frames.  Precedence is fixed and first match wins:
//!
//! 1. `$` + known GNSS talker id          → Positioning
//! 2. `+` + network status keyword         → ModemStatusLine
//! 3. `+` + data-service keyword family    → DataServiceResponse
//! 4. `OK` / `ERROR` / `READY` or command echo → ControlAck
//! 5. anything else (including empty)      → Unclassified

use super::frame::Category;

/// GNSS talker ids: GPS, GLONASS, Galileo, BeiDou, multi-constellation.
const GNSS_TALKERS: [&[u8; 2]; 5] = [b"GP", b"GL", b"GA", b"GB", b"GN"];

/// Registration, signal quality, operator, attach, functionality, SIM state.
const STATUS_KEYWORDS: [&[u8]; 6] = [b"CREG", b"CSQ", b"COPS", b"CGATT", b"CFUN", b"CPIN"];

/// MQTT service responses (`+CMQTTSTART`, `+CMQTTCONNECT`, `+CMQTTRXSTART`, ...).
const DATA_SERVICE_PREFIX: &[u8] = b"CMQTT";

const CONTROL_ACKS: [&[u8]; 3] = [b"OK", b"ERROR", b"READY"];

/// Command echo: bare `AT` or a command/configuration form.
const ECHO_PREFIXES: [&[u8]; 3] = [b"AT+", b"AT&", b"ATE"];

/// Classify one terminator-stripped line.
pub fn classify(line: &str) -> Category {
    classify_bytes(line.as_bytes())
}

/// Byte-level variant; lines are not required to be valid UTF-8.
pub fn classify_bytes(line: &[u8]) -> Category {
    match line {
        [b'$', a, b, ..] if GNSS_TALKERS.iter().any(|t| **t == [*a, *b]) => Category::Positioning,
        [b'+', rest @ ..] if STATUS_KEYWORDS.iter().any(|k| rest.starts_with(k)) => {
            Category::ModemStatusLine
        }
        [b'+', rest @ ..] if rest.starts_with(DATA_SERVICE_PREFIX) => {
            Category::DataServiceResponse
        }
        _ if CONTROL_ACKS.contains(&line) || is_echo(line) => Category::ControlAck,
        _ => Category::Unclassified,
    }
}

fn is_echo(line: &[u8]) -> bool {
    line == b"AT" || ECHO_PREFIXES.iter().any(|p| line.starts_with(p))
}
