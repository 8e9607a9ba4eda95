use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::hash::{Hash, Hasher};

/// A display name + address pair as found in a From/To/Cc header.
///
/// Equality, ordering and hashing ignore letter case on both fields, so
/// `"Bob" <BOB@x.com>` and `"bob" <bob@X.COM>` are the same entry.
#[derive(Debug, Clone)]
pub struct Address {
    display_name: String,
    address: String,
    // (address, name) lowercased; address first so files sort by mailbox
    key: (String, String),
}

impl Address {
    pub fn new(display_name: impl Into<String>, address: impl Into<String>) -> Self {
        let display_name = display_name.into();
        let address = address.into();
        let key = (fold(&address), fold(&display_name));
        Self {
            display_name,
            address,
            key,
        }
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn address(&self) -> &str {
        &self.address
    }
}

fn fold(s: &str) -> String {
    s.chars().flat_map(char::to_lowercase).collect()
}

impl PartialEq for Address {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Address {}

impl Ord for Address {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key.cmp(&other.key)
    }
}

impl PartialOrd for Address {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Hash for Address {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

/// Case-insensitively deduplicated set of addresses.
///
/// Iteration order is the case-folded (address, name) order, which keeps
/// checkpoint files stable for a given content.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddressSet {
    entries: BTreeSet<Address>,
}

impl AddressSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `address` unless an equal entry exists. The first spelling seen wins.
    pub fn add(&mut self, address: Address) -> bool {
        self.entries.insert(address)
    }

    pub fn merge(&mut self, other: &AddressSet) {
        for a in other.iter() {
            self.add(a.clone());
        }
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.entries.contains(address)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Stable ordered view used for serialization; can be called any number of times.
    pub fn iter(&self) -> impl Iterator<Item = &Address> + '_ {
        self.entries.iter()
    }
}

impl Extend<Address> for AddressSet {
    fn extend<I: IntoIterator<Item = Address>>(&mut self, iter: I) {
        for a in iter {
            self.add(a);
        }
    }
}

impl FromIterator<Address> for AddressSet {
    fn from_iter<I: IntoIterator<Item = Address>>(iter: I) -> Self {
        let mut set = AddressSet::new();
        set.extend(iter);
        set
    }
}
