use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Number of pads a filter declares on one side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arity {
    Fixed(usize),
    Unbounded,
}

impl Default for Arity {
    fn default() -> Self {
        Arity::Fixed(1)
    }
}

impl Arity {
    /// Whether `count` connections fit on this side.
    pub fn accepts(&self, count: usize) -> bool {
        match self {
            Arity::Fixed(n) => count <= *n,
            Arity::Unbounded => true,
        }
    }

    /// Whether `index` names an existing pad.
    pub fn contains(&self, index: usize) -> bool {
        match self {
            Arity::Fixed(n) => index < *n,
            Arity::Unbounded => true,
        }
    }

    pub fn fixed(&self) -> Option<usize> {
        match self {
            Arity::Fixed(n) => Some(*n),
            Arity::Unbounded => None,
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arity::Fixed(n) => write!(f, "{}", n),
            Arity::Unbounded => f.write_str("unbounded"),
        }
    }
}

impl Serialize for Arity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Arity::Fixed(n) => serializer.serialize_u64(*n as u64),
            Arity::Unbounded => serializer.serialize_str("unbounded"),
        }
    }
}

struct ArityVisitor;

impl<'de> Visitor<'de> for ArityVisitor {
    type Value = Arity;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a non-negative pad count or \"unbounded\"")
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Arity, E> {
        Ok(Arity::Fixed(v as usize))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Arity, E> {
        if v < 0 {
            return Err(E::custom(format!("pad count must not be negative, got {}", v)));
        }
        Ok(Arity::Fixed(v as usize))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Arity, E> {
        match v {
            "unbounded" | "N" => Ok(Arity::Unbounded),
            other => other
                .parse::<usize>()
                .map(Arity::Fixed)
                .map_err(|_| E::custom(format!("invalid arity {:?}", other))),
        }
    }
}

impl<'de> Deserialize<'de> for Arity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Arity, D::Error> {
        deserializer.deserialize_any(ArityVisitor)
    }
}
