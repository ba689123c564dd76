//! Packed status words.
//!
//! The ACS400 reports relay and digital-input states as bits inside
//! ordinary holding registers. A [`BitSpec`] names each flag and says which
//! register and bit it comes from; flags may span several registers.

use serde::Serialize;

/// One named flag: bit `bit` of the register at `address` (1-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitField {
    pub name: &'static str,
    pub address: u16,
    pub bit: u8,
}

/// Define a flag. Panics (at compile time in `const` context) if `bit` is
/// not a valid position in a 16-bit register.
pub const fn field(name: &'static str, address: u16, bit: u8) -> BitField {
    assert!(bit < 16, "bit offset must be below 16");
    BitField { name, address, bit }
}

/// Ordered flag layout for one logical status value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitSpec {
    pub name: &'static str,
    fields: &'static [BitField],
}

impl BitSpec {
    pub const fn new(name: &'static str, fields: &'static [BitField]) -> Self {
        assert!(!fields.is_empty(), "bit spec needs at least one field");
        Self { name, fields }
    }

    pub fn fields(&self) -> &'static [BitField] {
        self.fields
    }

    /// Distinct registers the spec reads, in first-use order.
    pub fn addresses(&self) -> Vec<u16> {
        let mut addresses: Vec<u16> = Vec::new();
        for field in self.fields {
            if !addresses.contains(&field.address) {
                addresses.push(field.address);
            }
        }
        addresses
    }

    /// Extract the flags from already-read register words.
    ///
    /// `words` pairs each address from [`addresses`](Self::addresses) with
    /// its raw value.
    ///
    /// # Panics
    ///
    /// Panics if a field's register is missing from `words`.
    pub fn decode(&self, words: &[(u16, u16)]) -> BitfieldValue {
        let flags = self
            .fields
            .iter()
            .map(|field| {
                let word = words
                    .iter()
                    .find(|(address, _)| *address == field.address)
                    .map(|(_, word)| *word)
                    .unwrap_or_else(|| {
                        panic!("register {} missing for flag {}", field.address, field.name)
                    });
                Flag {
                    name: field.name,
                    on: (word >> field.bit) & 0x01 == 1,
                }
            })
            .collect();

        BitfieldValue { flags }
    }
}

/// One decoded flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Flag {
    pub name: &'static str,
    pub on: bool,
}

/// Flags decoded from a [`BitSpec`], in spec order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BitfieldValue {
    flags: Vec<Flag>,
}

impl BitfieldValue {
    pub fn flags(&self) -> &[Flag] {
        &self.flags
    }

    /// State of a named flag.
    pub fn get(&self, name: &str) -> Option<bool> {
        self.flags.iter().find(|f| f.name == name).map(|f| f.on)
    }

    /// Flags as 0/1, in spec order.
    pub fn bits(&self) -> Vec<u8> {
        self.flags.iter().map(|f| f.on as u8).collect()
    }
}

/// Register 0117: DI1-DI4 status.
pub const REGISTER_DI1_4: u16 = 117;

/// Register 0121: DI5 and relay outputs.
pub const REGISTER_DI5_RELAYS: u16 = 121;

const RELAY_FIELDS: &[BitField] = &[
    field("relay1", REGISTER_DI5_RELAYS, 0),
    field("relay2", REGISTER_DI5_RELAYS, 1),
];

// DI5 sits at bit 3 of 0121, not bit 0 of a third word.
const DIGITAL_INPUT_FIELDS: &[BitField] = &[
    field("di1", REGISTER_DI1_4, 0),
    field("di2", REGISTER_DI1_4, 1),
    field("di3", REGISTER_DI1_4, 2),
    field("di4", REGISTER_DI1_4, 3),
    field("di5", REGISTER_DI5_RELAYS, 3),
];

/// Relay output status.
pub const RELAYS: BitSpec = BitSpec::new("relays", RELAY_FIELDS);

/// Digital input status.
pub const DIGITAL_INPUTS: BitSpec = BitSpec::new("digital_inputs", DIGITAL_INPUT_FIELDS);

#[cfg(test)]
mod tests {
    use super::*;

    const FOUR_BITS: BitSpec = BitSpec::new(
        "four",
        &[
            field("a", 117, 0),
            field("b", 117, 1),
            field("c", 117, 2),
            field("d", 117, 3),
        ],
    );

    #[test]
    fn decodes_low_four_bits() {
        let value = FOUR_BITS.decode(&[(117, 0b0000_1011)]);
        assert_eq!(value.bits(), vec![1, 1, 0, 1]);
    }

    #[test]
    fn relay_word() {
        let value = RELAYS.decode(&[(121, 0b10)]);
        assert_eq!(value.get("relay1"), Some(false));
        assert_eq!(value.get("relay2"), Some(true));
        assert_eq!(value.bits(), vec![0, 1]);
    }

    #[test]
    fn digital_inputs_span_two_words() {
        assert_eq!(DIGITAL_INPUTS.addresses(), vec![117, 121]);

        // Bit 0 of 0121 is relay 1 and must not leak into DI5.
        let value = DIGITAL_INPUTS.decode(&[(117, 0b0101), (121, 0b0001)]);
        assert_eq!(value.bits(), vec![1, 0, 1, 0, 0]);

        let value = DIGITAL_INPUTS.decode(&[(117, 0), (121, 0b1000)]);
        assert_eq!(value.get("di5"), Some(true));
    }

    #[test]
    fn high_bits_are_ignored() {
        let value = RELAYS.decode(&[(121, 0xFFFC)]);
        assert_eq!(value.bits(), vec![0, 0]);
    }

    #[test]
    fn addresses_deduplicated() {
        assert_eq!(RELAYS.addresses(), vec![121]);
        assert_eq!(FOUR_BITS.addresses(), vec![117]);
    }

    #[test]
    #[should_panic(expected = "bit offset must be below 16")]
    fn rejects_bit_out_of_range() {
        let _ = field("bogus", 121, 16);
    }

    #[test]
    #[should_panic(expected = "missing")]
    fn decode_requires_every_word() {
        let _ = DIGITAL_INPUTS.decode(&[(117, 0)]);
    }
}
