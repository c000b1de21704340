//! Unlock key table
//!
//! Restricted firmware commands are only accepted after a challenge/response
//! handshake. Which key the instrument expects depends on how it was branded,
//! and the product name alone does not tell: several brands share one name.
//! The driver therefore walks an ordered table of entries whose product name
//! matches and tries each key in turn.
//!
//! The table is plain configuration and the response derivation is an opaque
//! transform supplied by the caller, so no key material or vendor algorithm
//! lives in this crate.

use bytes::Bytes;
use i1d3_types::{SubVariant, Variant};

use crate::{constants::status, packet::Response};

/// Two-word unlock key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UnlockKey(pub u32, pub u32);

/// One configured unlock key and the variant it identifies
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnlockEntry {
    /// Product name the firmware must report, matched verbatim
    pub product_name: String,

    pub key: UnlockKey,

    pub variant: Variant,

    pub sub_variant: SubVariant,
}

impl UnlockEntry {
    pub fn new(
        product_name: impl Into<String>,
        key: UnlockKey,
        variant: Variant,
        sub_variant: SubVariant,
    ) -> Self {
        Self {
            product_name: product_name.into(),
            key,
            variant,
            sub_variant,
        }
    }
}

/// Ordered list of unlock keys
///
/// # Examples
///
/// ```
/// use i1d3_core::{UnlockEntry, UnlockKey, UnlockTable};
/// use i1d3_types::{SubVariant, Variant};
///
/// let table = UnlockTable::new()
///     .with_entry(UnlockEntry::new("i1Display3 ", UnlockKey(1, 2), Variant::DisplayPro, SubVariant::Retail))
///     .with_entry(UnlockEntry::new("Colormunki Display ", UnlockKey(3, 4), Variant::ColorMunkiDisplay, SubVariant::Retail))
///     .with_entry(UnlockEntry::new("i1Display3 ", UnlockKey(5, 6), Variant::DisplayPro, SubVariant::Oem));
///
/// let keys: Vec<_> = table.candidates("i1Display3 ").map(|e| e.key).collect();
/// assert_eq!(keys, vec![UnlockKey(1, 2), UnlockKey(5, 6)]);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnlockTable {
    entries: Vec<UnlockEntry>,
}

impl UnlockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry; order is the order keys are tried
    pub fn with_entry(mut self, entry: UnlockEntry) -> Self {
        self.entries.push(entry);
        self
    }

    pub fn push(&mut self, entry: UnlockEntry) {
        self.entries.push(entry);
    }

    /// Entries applicable to `product_name`, in table order
    pub fn candidates<'a>(&'a self, product_name: &'a str) -> impl Iterator<Item = &'a UnlockEntry> {
        self.entries
            .iter()
            .filter(move |e| e.product_name == product_name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<UnlockEntry> for UnlockTable {
    fn from_iter<I: IntoIterator<Item = UnlockEntry>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// Derives the unlock response from a challenge
///
/// `challenge` is the complete 64-byte challenge frame. The returned bytes
/// are sent as the response request's payload, starting right after the
/// command byte (at most 63 bytes).
pub trait UnlockResponder: Send + Sync {
    fn respond(&self, challenge: &[u8], key: UnlockKey) -> Bytes;
}

impl<F> UnlockResponder for F
where
    F: Fn(&[u8], UnlockKey) -> Bytes + Send + Sync,
{
    fn respond(&self, challenge: &[u8], key: UnlockKey) -> Bytes {
        self(challenge, key)
    }
}

/// Whether the instrument accepted an unlock response
pub fn is_accepted(response: &Response) -> bool {
    response.frame()[2] == status::UNLOCK_ACCEPTED
}

/// Whether a `GetLocked` answer means restricted commands are refused
pub fn is_locked(response: &Response) -> bool {
    let frame = response.frame();
    frame[2] != 0 || frame[3] == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Command;
    use bytes::BytesMut;
    use pretty_assertions::assert_eq;

    fn table() -> UnlockTable {
        [
            UnlockEntry::new("i1Display3 ", UnlockKey(0x11, 0x22), Variant::DisplayPro, SubVariant::Retail),
            UnlockEntry::new("Colormunki Display ", UnlockKey(0x33, 0x44), Variant::ColorMunkiDisplay, SubVariant::Retail),
            UnlockEntry::new("i1Display3 ", UnlockKey(0x55, 0x66), Variant::DisplayPro, SubVariant::NecSpectraSensorPro),
        ]
        .into_iter()
        .collect()
    }

    fn response(command: Command, b1: u8, b2: u8, b3: u8) -> Response {
        let mut buf = BytesMut::zeroed(64);
        buf[1] = b1;
        buf[2] = b2;
        buf[3] = b3;
        Response::decode(command, buf).unwrap()
    }

    #[test]
    fn test_candidates_preserve_order() {
        let table = table();
        let subs: Vec<_> = table.candidates("i1Display3 ").map(|e| e.sub_variant).collect();
        assert_eq!(subs, vec![SubVariant::Retail, SubVariant::NecSpectraSensorPro]);
    }

    #[test]
    fn test_candidates_match_verbatim() {
        let table = table();
        assert_eq!(table.candidates("i1Display3").count(), 0);
        assert_eq!(table.candidates("Colormunki Display ").count(), 1);
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn test_closure_responder() {
        let responder = |challenge: &[u8], key: UnlockKey| {
            Bytes::from(vec![challenge[2] ^ key.0 as u8])
        };
        let mut challenge = [0u8; 64];
        challenge[2] = 0xF0;
        assert_eq!(responder.respond(&challenge, UnlockKey(0x0F, 0)).as_ref(), &[0xFF]);
    }

    #[test]
    fn test_is_accepted() {
        assert!(is_accepted(&response(Command::LockResponse, 0x00, 0x77, 0)));
        assert!(!is_accepted(&response(Command::LockResponse, 0x00, 0x00, 0)));
    }

    #[test]
    fn test_is_locked() {
        assert!(!is_locked(&response(Command::GetLocked, 0x00, 0x00, 0x01)));
        assert!(is_locked(&response(Command::GetLocked, 0x00, 0x01, 0x01)));
        assert!(is_locked(&response(Command::GetLocked, 0x00, 0x00, 0x00)));
    }
}
