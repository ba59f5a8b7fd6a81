//! Absolute loader (LDA/BIC) paper-tape images.
//!
//! A tape is a stream of records:
//!
//! | Offset | Size | Meaning |
//! |--------|------|---------|
//! | 0      | 1    | sync byte, 0x01 |
//! | 1      | 1    | always 0x00 |
//! | 2      | 2    | record length, little endian, header included |
//! | 4      | 2    | load address, little endian |
//! | 6      | n-6  | payload |
//! | n      | 1    | checksum |
//!
//! The checksum makes the byte sum from the length-low byte through the
//! checksum itself come out to 0 mod 256. A record with length 6 and a
//! load address other than 1 carries the start PC instead of data; a load
//! address of 1 (or a zero length) terminates the stream. Streams without
//! a start record are BIC files entered at 0200.

use thiserror::Error;

/// Default entry point for BIC files that carry no start record.
pub const BIC_DEFAULT_START: u16 = 0o200;

/// Errors from a malformed tape image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LdaError {
    /// A record header or payload was cut short.
    #[error("truncated record at byte offset {offset}")]
    Truncated { offset: usize },

    /// The record checksum didn't balance.
    #[error("checksum error in record at byte offset {offset} (sum {sum:#04x})")]
    Checksum { offset: usize, sum: u8 },

    /// A record length smaller than its own header.
    #[error("impossible record length {length} at byte offset {offset}")]
    BadLength { offset: usize, length: u16 },
}

/// One data record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LdaRecord {
    /// Load address of the first payload byte.
    pub address: u16,
    pub data: Vec<u8>,
}

/// A parsed tape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LdaImage {
    pub records: Vec<LdaRecord>,
    /// Entry point: from the start record, or [`BIC_DEFAULT_START`].
    pub start: u16,
}

/// Parse a complete tape image.
pub fn parse(bytes: &[u8]) -> Result<LdaImage, LdaError> {
    let mut records = Vec::new();
    let mut start = None;
    let mut offset = 0;

    loop {
        // tapes may run out between records; that ends the stream
        let Some(header) = bytes.get(offset..offset + 6) else {
            break;
        };

        let length = u16::from(header[2]) | u16::from(header[3]) << 8;
        let address = u16::from(header[4]) | u16::from(header[5]) << 8;

        if length == 0 || address == 1 {
            break;
        }
        if length < 6 {
            return Err(LdaError::BadLength { offset, length });
        }

        let payload_len = usize::from(length) - 6;
        let end = offset + 6 + payload_len;
        let Some(payload) = bytes.get(offset + 6..end) else {
            return Err(LdaError::Truncated { offset });
        };
        let Some(&checksum) = bytes.get(end) else {
            return Err(LdaError::Truncated { offset });
        };

        let sum = header[2..]
            .iter()
            .chain(payload)
            .chain(std::iter::once(&checksum))
            .fold(0u8, |acc, &b| acc.wrapping_add(b));
        if sum != 0 {
            return Err(LdaError::Checksum { offset, sum });
        }

        if payload_len == 0 {
            start = Some(address);
        } else {
            records.push(LdaRecord {
                address,
                data: payload.to_vec(),
            });
        }

        offset = end + 1;
    }

    Ok(LdaImage {
        records,
        start: start.unwrap_or(BIC_DEFAULT_START),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build one framed record with a balancing checksum.
    fn record(address: u16, payload: &[u8]) -> Vec<u8> {
        let length = payload.len() as u16 + 6;
        let mut out = vec![
            0x01,
            0x00,
            length as u8,
            (length >> 8) as u8,
            address as u8,
            (address >> 8) as u8,
        ];
        out.extend_from_slice(payload);

        let sum = out[2..].iter().fold(0u8, |acc, &b| acc.wrapping_add(b));
        out.push(sum.wrapping_neg());
        out
    }

    #[test]
    fn test_single_data_record() {
        let tape = record(0o1000, &[1, 2, 3]);
        let image = parse(&tape).expect("valid tape");
        assert_eq!(image.records.len(), 1);
        assert_eq!(image.records[0].address, 0o1000);
        assert_eq!(image.records[0].data, vec![1, 2, 3]);
        assert_eq!(image.start, BIC_DEFAULT_START);
    }

    #[test]
    fn test_start_record_sets_entry_point() {
        let mut tape = record(0o2000, &[0o123]);
        tape.extend(record(0o2000, &[])); // length 6, address != 1
        tape.extend(record(1, &[])); // terminator
        let image = parse(&tape).expect("valid tape");
        assert_eq!(image.start, 0o2000);
        assert_eq!(image.records.len(), 1);
    }

    #[test]
    fn test_terminator_stops_parsing() {
        let mut tape = record(1, &[]);
        tape.extend(record(0o3000, &[9])); // never reached
        let image = parse(&tape).expect("valid tape");
        assert!(image.records.is_empty());
    }

    #[test]
    fn test_bad_checksum_rejected() {
        let mut tape = record(0o1000, &[1, 2, 3]);
        let last = tape.len() - 1;
        tape[last] = tape[last].wrapping_add(1);
        assert!(matches!(parse(&tape), Err(LdaError::Checksum { .. })));
    }

    #[test]
    fn test_truncated_payload_rejected() {
        let mut tape = record(0o1000, &[1, 2, 3]);
        tape.truncate(tape.len() - 2);
        assert!(matches!(parse(&tape), Err(LdaError::Truncated { .. })));
    }

    #[test]
    fn test_multiple_records() {
        let mut tape = record(0o1000, &[0o12, 0o34]);
        tape.extend(record(0o1100, &[0o56]));
        let image = parse(&tape).expect("valid tape");
        assert_eq!(image.records.len(), 2);
        assert_eq!(image.records[1].address, 0o1100);
    }
}
