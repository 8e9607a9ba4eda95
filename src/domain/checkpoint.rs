use crate::domain::address::AddressSet;

/// Scan progress: the first `consumed` messages of the mailbox (by sequence
/// number) have been read and their addresses are in `addresses`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Checkpoint {
    consumed: u32,
    addresses: AddressSet,
}

impl Checkpoint {
    pub fn new(consumed: u32, addresses: AddressSet) -> Self {
        Self {
            consumed,
            addresses,
        }
    }

    pub fn consumed(&self) -> u32 {
        self.consumed
    }

    pub fn addresses(&self) -> &AddressSet {
        &self.addresses
    }

    /// Moves the counter forward to `consumed` and merges `batch`.
    ///
    /// Returns false (and changes nothing) if `consumed` would not advance the counter.
    pub fn advance(&mut self, consumed: u32, batch: &AddressSet) -> bool {
        if consumed <= self.consumed {
            return false;
        }
        self.consumed = consumed;
        self.addresses.merge(batch);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::address::Address;

    #[test]
    fn advance_never_moves_backwards() {
        let batch: AddressSet = [Address::new("", "a@x.com")].into_iter().collect();
        let mut cp = Checkpoint::default();

        assert!(cp.advance(200, &batch));
        assert_eq!(cp.consumed(), 200);

        let later: AddressSet = [Address::new("", "b@x.com")].into_iter().collect();
        assert!(!cp.advance(150, &later));
        assert!(!cp.advance(200, &later));
        assert_eq!(cp.consumed(), 200);
        assert_eq!(cp.addresses().len(), 1);

        assert!(cp.advance(201, &later));
        assert_eq!(cp.addresses().len(), 2);
    }
}
