use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use pdubuf_pdu::PduRef;
use serde::Serialize;
use serde_json::Value;

use crate::fields::{bytes_text, hex};

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct PduOutput<'a> {
    event: &'a str,
    service: u8,
    opcode: u8,
    length: u16,
    payload_hex: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    fields: Option<&'a [Value]>,
    fds: usize,
    timestamp: String,
}

/// A PDU seen by a command, with what the command learned about it.
pub struct PduReport<'a> {
    pub event: &'a str,
    pub pdu: PduRef<'a>,
    pub fields: Option<&'a [Value]>,
    pub fds: usize,
}

pub fn print_pdu(report: &PduReport<'_>, format: OutputFormat) {
    let pdu = &report.pdu;
    match format {
        OutputFormat::Json => {
            let out = PduOutput {
                event: report.event,
                service: pdu.service(),
                opcode: pdu.opcode(),
                length: pdu.len(),
                payload_hex: hex(pdu.payload()),
                fields: report.fields,
                fds: report.fds,
                timestamp: now_unix_seconds(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["EVENT", "SERVICE", "OPCODE", "LENGTH", "FDS", "PAYLOAD"])
                .add_row(vec![
                    report.event.to_string(),
                    pdu.service().to_string(),
                    pdu.opcode().to_string(),
                    pdu.len().to_string(),
                    report.fds.to_string(),
                    payload_preview(pdu.payload()),
                ]);
            if let Some(fields) = report.fields {
                for (index, value) in fields.iter().enumerate() {
                    table.add_row(vec![
                        String::new(),
                        String::new(),
                        String::new(),
                        String::new(),
                        format!("#{index}"),
                        value.to_string(),
                    ]);
                }
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "{} service={} opcode={} length={} fds={} payload={}",
                report.event,
                pdu.service(),
                pdu.opcode(),
                pdu.len(),
                report.fds,
                payload_preview(pdu.payload())
            );
            if let Some(fields) = report.fields {
                for (index, value) in fields.iter().enumerate() {
                    println!("  [{index}] {value}");
                }
            }
        }
        OutputFormat::Raw => {
            print_raw(pdu.as_bytes());
        }
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn payload_preview(payload: &[u8]) -> String {
    if payload.is_empty() {
        return "<empty>".to_string();
    }
    let text = bytes_text(payload);
    if text.len() > 64 {
        let cut = (0..=64).rev().find(|&i| text.is_char_boundary(i)).unwrap_or(0);
        format!("{}... ({} bytes)", &text[..cut], payload.len())
    } else {
        text
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_truncates_long_text_on_char_boundary() {
        let text = "é".repeat(40);
        let preview = payload_preview(text.as_bytes());
        assert!(preview.ends_with("(80 bytes)"));
        assert!(preview.starts_with("éé"));
    }

    #[test]
    fn preview_marks_empty_payloads() {
        assert_eq!(payload_preview(b""), "<empty>");
        assert_eq!(payload_preview(b"hi"), "hi");
        assert_eq!(payload_preview(&[0xfe]), "fe");
    }
}
