//! Register catalog for the ACS400.
//!
//! Drive parameters are numbered `GGII`: group `GG` and index `II` within
//! the group. The Modbus holding register for a parameter is that number
//! (1-based), so parameter 0103 (output frequency) lives at address 103.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Highest index a group can hold (`GG99`).
pub const MAX_INDEX: u16 = 99;

/// Highest group number that keeps `group * 100 + index` within the ACS400 map.
pub const MAX_GROUP: u16 = 99;

/// Parameter groups probed by a full diagnostic dump.
pub const ACS400_PARAMETER_GROUPS: [u16; 25] = [
    99, 1, 10, 11, 12, 13, 14, 15, 16, 20, 21, 22, 25, 26, 30, 31, 32, 33, 34, 40, 41, 50, 51,
    52, 81,
];

/// Catalog construction errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    #[error("group {0} is outside 1..={MAX_GROUP}")]
    GroupOutOfRange(u16),
    #[error("index {index} in group {group} is outside 1..={MAX_INDEX}")]
    IndexOutOfRange { group: u16, index: u16 },
    #[error("register {group:02}{index:02} is defined twice")]
    Duplicate { group: u16, index: u16 },
    #[error("scale denominator must be non-zero ({group:02}{index:02})")]
    ZeroDenominator { group: u16, index: u16 },
}

/// Exact rational multiplier from raw register value to engineering value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Scale {
    pub numerator: i32,
    pub denominator: u32,
}

impl Scale {
    pub const UNIT: Scale = Scale::new(1, 1);
    pub const DECI: Scale = Scale::new(1, 10);
    pub const CENTI: Scale = Scale::new(1, 100);

    pub const fn new(numerator: i32, denominator: u32) -> Self {
        Self {
            numerator,
            denominator,
        }
    }

    /// Scale expressed as a float (e.g. 0.1).
    pub fn factor(&self) -> f64 {
        self.numerator as f64 / self.denominator as f64
    }

    /// Convert a raw register value to its engineering value.
    pub fn apply(&self, raw: u16) -> f64 {
        raw as f64 * self.factor()
    }

    /// Convert an engineering value back to the nearest raw register value.
    ///
    /// Returns `None` when the result does not fit a 16-bit register.
    pub fn unapply(&self, value: f64) -> Option<u16> {
        if self.numerator == 0 || !value.is_finite() {
            return None;
        }
        let raw = (value / self.factor()).round();
        if (0.0..=u16::MAX as f64).contains(&raw) {
            Some(raw as u16)
        } else {
            None
        }
    }
}

impl fmt::Display for Scale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.denominator == 1 {
            write!(f, "{}", self.numerator)
        } else {
            write!(f, "{}/{}", self.numerator, self.denominator)
        }
    }
}

/// Metadata for one drive register.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegisterEntry {
    pub group: u16,
    pub index: u16,
    /// 1-based device register number (`group * 100 + index`).
    pub address: u16,
    pub scale: Scale,
    pub name: String,
    pub unit: String,
}

impl RegisterEntry {
    /// Parameter code as shown on the drive panel, e.g. `0103`.
    pub fn code(&self) -> String {
        format!("{:02}{:02}", self.group, self.index)
    }
}

/// Compute the device address of a parameter.
pub const fn register_address(group: u16, index: u16) -> u16 {
    group * 100 + index
}

/// An ordered group of registers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegisterGroup {
    pub id: u16,
    pub name: String,
    entries: Vec<RegisterEntry>,
}

impl RegisterGroup {
    /// Registers in definition order.
    pub fn entries(&self) -> &[RegisterEntry] {
        &self.entries
    }
}

/// Validated register metadata, keyed by group.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Catalog {
    groups: BTreeMap<u16, RegisterGroup>,
}

impl Catalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in ACS400 register table.
    pub fn acs400() -> Self {
        let mut catalog = Self::new();
        for (group, name, rows) in ACS400_TABLE {
            catalog.add_group(*group, *name);
            for (index, scale, reg_name, unit) in *rows {
                let inserted = catalog
                    .insert(*group, *index, *scale, *reg_name, *unit)
                    .map(|_| ());
                debug_assert!(inserted.is_ok(), "built-in register: {inserted:?}");
            }
        }
        catalog
    }

    /// Declare a group. Renames it if it already exists.
    pub fn add_group(&mut self, id: u16, name: impl Into<String>) {
        let name = name.into();
        self.groups
            .entry(id)
            .and_modify(|g| g.name = name.clone())
            .or_insert_with(|| RegisterGroup {
                id,
                name,
                entries: Vec::new(),
            });
    }

    /// Add a register, creating its group if needed.
    pub fn insert(
        &mut self,
        group: u16,
        index: u16,
        scale: Scale,
        name: impl Into<String>,
        unit: impl Into<String>,
    ) -> Result<&RegisterEntry, CatalogError> {
        if group == 0 || group > MAX_GROUP {
            return Err(CatalogError::GroupOutOfRange(group));
        }
        if index == 0 || index > MAX_INDEX {
            return Err(CatalogError::IndexOutOfRange { group, index });
        }
        if scale.denominator == 0 {
            return Err(CatalogError::ZeroDenominator { group, index });
        }

        let target = self.groups.entry(group).or_insert_with(|| RegisterGroup {
            id: group,
            name: format!("Group {group}"),
            entries: Vec::new(),
        });

        // Address is derived from (group, index), so this also keeps
        // addresses unique within the group.
        if target.entries.iter().any(|e| e.index == index) {
            return Err(CatalogError::Duplicate { group, index });
        }

        target.entries.push(RegisterEntry {
            group,
            index,
            address: register_address(group, index),
            scale,
            name: name.into(),
            unit: unit.into(),
        });
        Ok(&target.entries[target.entries.len() - 1])
    }

    /// Look up a register by `(group, index)`.
    pub fn lookup(&self, group: u16, index: u16) -> Option<&RegisterEntry> {
        self.groups
            .get(&group)?
            .entries
            .iter()
            .find(|e| e.index == index)
    }

    /// Look up a register by device address.
    pub fn by_address(&self, address: u16) -> Option<&RegisterEntry> {
        self.lookup(address / 100, address % 100)
    }

    pub fn group(&self, id: u16) -> Option<&RegisterGroup> {
        self.groups.get(&id)
    }

    /// Groups in ascending id order.
    pub fn groups(&self) -> impl Iterator<Item = &RegisterGroup> {
        self.groups.values()
    }

    /// Total number of registers.
    pub fn len(&self) -> usize {
        self.groups.values().map(|g| g.entries.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

type TableRow = (u16, Scale, &'static str, &'static str);

const OPERATING_DATA: &[TableRow] = &[
    (2, Scale::UNIT, "Speed", "rpm"),
    (3, Scale::DECI, "Output Freq", "Hz"),
    (4, Scale::DECI, "Current", "A"),
    (5, Scale::DECI, "Torque", "%"),
    (6, Scale::DECI, "Power", "kW"),
    (7, Scale::DECI, "DC Bus Voltage", "V"),
    (9, Scale::DECI, "Output Voltage", "V"),
    (10, Scale::DECI, "ACS400 Temp", "degC"),
    (11, Scale::DECI, "External Ref 1", "Hz"),
    (12, Scale::DECI, "External Ref 2", "%"),
    (13, Scale::UNIT, "Ctrl Location", "-"),
    (14, Scale::UNIT, "Run Time", "h"),
    (15, Scale::UNIT, "kWh Counter", "kWh"),
    (16, Scale::DECI, "Appl Blk Output", "%"),
    (17, Scale::UNIT, "DI1-DI4 Status", "-"),
    (18, Scale::DECI, "AI1", "%"),
    (19, Scale::DECI, "AI2", "%"),
    (21, Scale::UNIT, "DI5 & Relays", "-"),
    (22, Scale::DECI, "AO", "mA"),
    (24, Scale::DECI, "Actual Value 1", "%"),
    (25, Scale::DECI, "Actual Value 2", "%"),
    (26, Scale::DECI, "Control Dev", "%"),
    (27, Scale::DECI, "PID Act Value", "%"),
    (28, Scale::UNIT, "Last Fault", "-"),
    (29, Scale::UNIT, "Previous Fault", "-"),
    (30, Scale::UNIT, "Oldest Fault", "-"),
    (31, Scale::UNIT, "Ser Link Data 1", "-"),
    (32, Scale::UNIT, "Ser Link Data 2", "-"),
    (33, Scale::UNIT, "Ser Link Data 3", "-"),
    (34, Scale::UNIT, "Process Var 1", "-"),
    (35, Scale::UNIT, "Process Var 2", "-"),
    (36, Scale::CENTI, "Run Time", "kh"),
    (37, Scale::UNIT, "MWh Counter", "MWh"),
];

const PID_CONTROL: &[TableRow] = &[(20, Scale::DECI, "Internal setpoint", "%")];

const ACS400_TABLE: &[(u16, &str, &[TableRow])] = &[
    (1, "Operating data", OPERATING_DATA),
    (40, "PID Control", PID_CONTROL),
];
