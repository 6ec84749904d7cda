use ethers::types::U256;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::ops::{Add, AddAssign};
use std::str::FromStr;

/// Arbitrary-precision non-negative integer, stored as a decimal string.
///
/// Spec §9: "Large numeric values (token balances, wei amounts) must be
/// handled with arbitrary-precision integers; storage is as decimal
/// strings." `ethers::types::U256` gives us the 256-bit arithmetic; this
/// wrapper pins its serde representation to the decimal string the spec
/// requires instead of ethers' default hex encoding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Amount(pub U256);

impl Amount {
    pub const ZERO: Amount = Amount(U256::zero());

    pub fn from_u64(v: u64) -> Self {
        Self(U256::from(v))
    }

    pub fn saturating_add(self, other: Amount) -> Amount {
        Amount(self.0.saturating_add(other.0))
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }
}

impl Add for Amount {
    type Output = Amount;
    fn add(self, rhs: Amount) -> Amount {
        Amount(self.0 + rhs.0)
    }
}

impl AddAssign for Amount {
    fn add_assign(&mut self, rhs: Amount) {
        self.0 += rhs.0;
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Amount {
    type Err = ethers::abi::ethabi::ethereum_types::FromDecStrErr;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        U256::from_dec_str(s).map(Amount)
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        U256::from_dec_str(&raw)
            .map(Amount)
            .map_err(|e| de::Error::custom(format!("invalid decimal amount '{raw}': {e}")))
    }
}
