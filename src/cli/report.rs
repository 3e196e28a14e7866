use crate::common::Result;
use crate::storage::AccessLogRecord;
use std::io::Write;

pub fn print_access_records<W: Write>(
    out: &mut W,
    title: &str,
    records: &[AccessLogRecord],
) -> Result<()> {
    writeln!(out, "\n{}:", title)?;
    writeln!(out, "{}", "-".repeat(80))?;
    for record in records {
        let status = if record.authorized { "AUTHORIZED" } else { "UNAUTHORIZED" };
        write!(
            out,
            "{} | {:15} | {:12} | {}",
            record.timestamp.format("%Y-%m-%d %H:%M:%S"),
            record.identity,
            status,
            record.method
        )?;
        if let Some(path) = &record.evidence_path {
            write!(out, " | {}", path.display())?;
        }
        writeln!(out)?;
    }
    if records.is_empty() {
        writeln!(out, "(none)")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::access::UnlockMethod;
    use chrono::{Local, TimeZone};

    #[test]
    fn test_report_layout() {
        let record = AccessLogRecord {
            timestamp: Local.with_ymd_and_hms(2024, 3, 1, 8, 30, 0).unwrap(),
            identity: "Stranger".into(),
            authorized: false,
            method: UnlockMethod::Face,
            evidence_path: Some("db/intruder_images/intruder_1.jpg".into()),
        };

        let mut out = Vec::new();
        print_access_records(&mut out, "Recent Access Attempts", &[record]).unwrap();
        let out = String::from_utf8(out).unwrap();

        assert!(out.contains("Recent Access Attempts:"));
        assert!(out.contains(
            "2024-03-01 08:30:00 | Stranger        | UNAUTHORIZED | face | \
             db/intruder_images/intruder_1.jpg"
        ));
    }

    #[test]
    fn test_empty_report() {
        let mut out = Vec::new();
        print_access_records(&mut out, "Unauthorized Attempts Today", &[]).unwrap();
        assert!(String::from_utf8(out).unwrap().contains("(none)"));
    }
}
