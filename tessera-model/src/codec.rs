//! Canonical encoding of namespaces and indices
//!
//! Encoding walks the sorted CRDT maps, so equal values always produce the
//! same bytes. Decoding is tolerant: malformed entries are reported in
//! [`Decoded::invalid`] and skipped, and the valid remainder is returned.
//! Only a protobuf-level failure rejects the whole blob.

use crate::crdt::{Entry, Index, Link, Namespace, Point, Row, Table};
use crate::proto::{
    IndexEntryMessage, IndexMessage, LinkMessage, NamespaceEntryMessage, NamespaceMessage,
    PointMessage,
};
use crate::types::{Address, AddressError, Signature, SignatureError, SignatureSet};
use prost::Message;
use std::fmt;

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("malformed protobuf: {0}")]
    Protobuf(#[from] prost::DecodeError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidReason {
    EmptyTable,
    EmptyRow,
    EmptyEntry,
    Address(AddressError),
    Signature(SignatureError),
}

impl fmt::Display for InvalidReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvalidReason::EmptyTable => f.write_str("empty table name"),
            InvalidReason::EmptyRow => f.write_str("empty row name"),
            InvalidReason::EmptyEntry => f.write_str("empty entry name"),
            InvalidReason::Address(e) => write!(f, "{e}"),
            InvalidReason::Signature(e) => write!(f, "{e}"),
        }
    }
}

/// A skipped stream entry and where it sat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidEntry {
    /// Slash-separated path of the entry, e.g. `cars/car10/driver`.
    pub location: String,
    pub reason: InvalidReason,
}

/// Result of a tolerant decode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded<T> {
    pub value: T,
    pub invalid: Vec<InvalidEntry>,
}

impl<T> Decoded<T> {
    pub fn is_clean(&self) -> bool {
        self.invalid.is_empty()
    }

    /// Warn about skipped entries and return the value.
    pub fn into_logged(self, blob: &str) -> T {
        if !self.invalid.is_empty() {
            tracing::warn!(
                blob,
                invalid = self.invalid.len(),
                first = %self.invalid[0].reason,
                "Skipped invalid entries while decoding"
            );
        }
        self.value
    }
}

fn encode_signatures(signatures: &SignatureSet) -> Vec<String> {
    signatures.iter().map(Signature::to_base58).collect()
}

fn decode_signatures(texts: &[String]) -> Result<SignatureSet, SignatureError> {
    texts.iter().map(|t| Signature::from_base58(t)).collect()
}

// ---------------------------------------------------------------------------
// Namespace
// ---------------------------------------------------------------------------

pub fn namespace_to_message(namespace: &Namespace) -> NamespaceMessage {
    let mut entries = Vec::new();
    for (table, t) in namespace.tables() {
        for (row, r) in t.rows() {
            for (entry, e) in r.entries() {
                entries.push(NamespaceEntryMessage {
                    table: table.to_string(),
                    row: row.to_string(),
                    entry: entry.to_string(),
                    points: e
                        .points()
                        .map(|p| PointMessage {
                            text: p.text().to_string(),
                            signatures: encode_signatures(p.signatures()),
                        })
                        .collect(),
                });
            }
        }
    }
    NamespaceMessage { entries }
}

pub fn namespace_from_message(message: NamespaceMessage) -> Decoded<Namespace> {
    let mut namespace = Namespace::new();
    let mut invalid = Vec::new();

    for item in message.entries {
        let location = format!("{}/{}/{}", item.table, item.row, item.entry);
        let empty_name = if item.table.is_empty() {
            Some(InvalidReason::EmptyTable)
        } else if item.row.is_empty() {
            Some(InvalidReason::EmptyRow)
        } else if item.entry.is_empty() {
            Some(InvalidReason::EmptyEntry)
        } else {
            None
        };
        if let Some(reason) = empty_name {
            invalid.push(InvalidEntry { location, reason });
            continue;
        }

        let mut entry = Entry::new();
        for point in item.points {
            match decode_signatures(&point.signatures) {
                Ok(signatures) => entry.add_point(Point::with_signatures(point.text, signatures)),
                Err(e) => invalid.push(InvalidEntry {
                    location: format!("{location}/{}", point.text),
                    reason: InvalidReason::Signature(e),
                }),
            }
        }

        let row = Row::new().with_entry(item.entry, entry);
        namespace.add_table(item.table, Table::new().with_row(item.row, row));
    }

    Decoded {
        value: namespace,
        invalid,
    }
}

pub fn encode_namespace(namespace: &Namespace) -> Vec<u8> {
    namespace_to_message(namespace).encode_to_vec()
}

pub fn decode_namespace(bytes: &[u8]) -> Result<Decoded<Namespace>, DecodeError> {
    Ok(namespace_from_message(NamespaceMessage::decode(bytes)?))
}

// ---------------------------------------------------------------------------
// Index
// ---------------------------------------------------------------------------

pub fn index_to_message(index: &Index) -> IndexMessage {
    let entries = index
        .table_names()
        .map(|table| IndexEntryMessage {
            table: table.to_string(),
            links: index
                .links(table)
                .map(|link| LinkMessage {
                    address: link.address().to_string(),
                    signatures: encode_signatures(link.signatures()),
                })
                .collect(),
        })
        .collect();
    IndexMessage { entries }
}

pub fn index_from_message(message: IndexMessage) -> Decoded<Index> {
    let mut index = Index::new();
    let mut invalid = Vec::new();

    for item in message.entries {
        if item.table.is_empty() {
            invalid.push(InvalidEntry {
                location: String::new(),
                reason: InvalidReason::EmptyTable,
            });
            continue;
        }
        for link in item.links {
            let location = format!("{}/{}", item.table, link.address);
            let address = match Address::new(link.address) {
                Ok(address) => address,
                Err(e) => {
                    invalid.push(InvalidEntry {
                        location,
                        reason: InvalidReason::Address(e),
                    });
                    continue;
                }
            };
            match decode_signatures(&link.signatures) {
                Ok(signatures) => index.add_link(item.table.as_str(), Link::with_signatures(address, signatures)),
                Err(e) => invalid.push(InvalidEntry {
                    location,
                    reason: InvalidReason::Signature(e),
                }),
            }
        }
    }

    Decoded {
        value: index,
        invalid,
    }
}

pub fn encode_index(index: &Index) -> Vec<u8> {
    index_to_message(index).encode_to_vec()
}

pub fn decode_index(bytes: &[u8]) -> Result<Decoded<Index>, DecodeError> {
    Ok(index_from_message(IndexMessage::decode(bytes)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::PrivateKey;

    fn sample_namespace() -> Namespace {
        let key = PrivateKey::generate();
        let row = Row::new()
            .with_entry("driver", Entry::new().with_point(Point::signed("Mr Blogs", std::slice::from_ref(&key))))
            .with_entry("colour", Entry::from_texts(["red", "blue"]));
        Namespace::single("cars", Table::new().with_row("car10", row))
    }

    #[test]
    fn test_uninitialized_signatures_survive_round_trip() {
        let namespace = Namespace::single(
            "cars",
            Table::new().with_row(
                "car10",
                Row::new().with_entry("driver", Entry::new().with_point(Point::with_signatures("A", [Signature::default()]))),
            ),
        );
        let decoded = decode_namespace(&encode_namespace(&namespace)).unwrap();
        assert!(decoded.is_clean());
        assert_eq!(decoded.value, namespace);

        let address = Address::new("QmCars").unwrap();
        let index = Index::single("cars", Link::with_signatures(address, [Signature::default()]));
        let decoded = decode_index(&encode_index(&index)).unwrap();
        assert!(decoded.is_clean());
        assert_eq!(decoded.value, index);
    }

    #[test]
    fn test_namespace_round_trip() {
        let namespace = sample_namespace();
        let decoded = decode_namespace(&encode_namespace(&namespace)).unwrap();
        assert!(decoded.is_clean());
        assert_eq!(decoded.value, namespace);
    }

    #[test]
    fn test_index_round_trip() {
        let key = PrivateKey::generate();
        let index = Index::single("cars", Link::signed(Address::new("QmCars").unwrap(), &[key]))
            .with_link("people", Link::unsigned(Address::new("QmPeope").unwrap()));
        let decoded = decode_index(&encode_index(&index)).unwrap();
        assert!(decoded.is_clean());
        assert_eq!(decoded.value, index);
    }

    #[test]
    fn test_empty_values_encode_to_nothing() {
        assert!(encode_namespace(&Namespace::new()).is_empty());
        assert!(encode_index(&Index::new()).is_empty());
        assert_eq!(decode_index(&[]).unwrap().value, Index::new());
    }

    #[test]
    fn test_invalid_entries_are_reported_and_skipped() {
        let message = IndexMessage {
            entries: vec![
                IndexEntryMessage {
                    table: "cars".into(),
                    links: vec![
                        LinkMessage { address: "QmGood".into(), signatures: vec![] },
                        LinkMessage { address: String::new(), signatures: vec![] },
                        LinkMessage { address: "QmBadSig".into(), signatures: vec!["0OIl".into()] },
                    ],
                },
                IndexEntryMessage { table: String::new(), links: vec![] },
            ],
        };

        let decoded = decode_index(&message.encode_to_vec()).unwrap();
        assert_eq!(decoded.value, Index::single("cars", Link::unsigned(Address::new("QmGood").unwrap())));
        assert_eq!(decoded.invalid.len(), 3);
        assert_eq!(decoded.invalid[0].reason, InvalidReason::Address(AddressError::Empty));
        assert!(matches!(decoded.invalid[1].reason, InvalidReason::Signature(_)));
        assert_eq!(decoded.invalid[2].reason, InvalidReason::EmptyTable);
    }

    #[test]
    fn test_namespace_with_empty_names_is_tolerated() {
        let message = NamespaceMessage {
            entries: vec![
                NamespaceEntryMessage {
                    table: "cars".into(),
                    row: String::new(),
                    entry: "driver".into(),
                    points: vec![PointMessage { text: "x".into(), signatures: vec![] }],
                },
                NamespaceEntryMessage {
                    table: "cars".into(),
                    row: "car1".into(),
                    entry: "driver".into(),
                    points: vec![PointMessage { text: "y".into(), signatures: vec![] }],
                },
            ],
        };

        let decoded = decode_namespace(&message.encode_to_vec()).unwrap();
        assert_eq!(decoded.invalid.len(), 1);
        assert_eq!(decoded.invalid[0].reason, InvalidReason::EmptyRow);
        let driver = decoded.value.get_table("cars").and_then(|t| t.get_row("car1")).and_then(|r| r.get_entry("driver"));
        assert_eq!(driver, Some(&Entry::from_texts(["y"])));
    }

    #[test]
    fn test_garbage_is_a_decode_error() {
        assert!(decode_namespace(&[0xff, 0xff, 0xff]).is_err());
    }
}
