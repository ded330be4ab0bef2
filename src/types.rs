use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::str::FromStr;

use serde::Deserialize;

/// A single kind of filesystem change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Create,
    Write,
    Remove,
    Rename,
    /// Permission / metadata change (`chmod` in config files).
    Chmod,
}

impl Op {
    pub const ALL: [Op; 5] = [Op::Create, Op::Write, Op::Remove, Op::Rename, Op::Chmod];

    fn bit(self) -> u8 {
        match self {
            Op::Create => 1 << 0,
            Op::Write => 1 << 1,
            Op::Remove => 1 << 2,
            Op::Rename => 1 << 3,
            Op::Chmod => 1 << 4,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Op::Create => "CREATE",
            Op::Write => "WRITE",
            Op::Remove => "REMOVE",
            Op::Rename => "RENAME",
            Op::Chmod => "CHMOD",
        }
    }
}

impl FromStr for Op {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "CREATE" => Ok(Op::Create),
            "WRITE" => Ok(Op::Write),
            "REMOVE" => Ok(Op::Remove),
            "RENAME" => Ok(Op::Rename),
            "CHMOD" | "ATTRIB" => Ok(Op::Chmod),
            other => Err(format!("unknown operation {other:?}")),
        }
    }
}

/// Bitset over [`Op`].
///
/// An empty mask on a rule means "react to every operation".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct OpMask(u8);

impl OpMask {
    pub const EMPTY: OpMask = OpMask(0);

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn contains(self, op: Op) -> bool {
        self.0 & op.bit() != 0
    }

    /// True if `self` and `other` share at least one flag.
    pub fn intersects(self, other: OpMask) -> bool {
        self.0 & other.0 != 0
    }

    pub fn iter(self) -> impl Iterator<Item = Op> {
        Op::ALL.into_iter().filter(move |op| self.contains(*op))
    }
}

impl From<Op> for OpMask {
    fn from(op: Op) -> Self {
        OpMask(op.bit())
    }
}

impl FromIterator<Op> for OpMask {
    fn from_iter<I: IntoIterator<Item = Op>>(iter: I) -> Self {
        iter.into_iter().fold(OpMask::EMPTY, |acc, op| acc | op)
    }
}

impl BitOr<Op> for OpMask {
    type Output = OpMask;

    fn bitor(self, rhs: Op) -> OpMask {
        OpMask(self.0 | rhs.bit())
    }
}

impl BitOr for OpMask {
    type Output = OpMask;

    fn bitor(self, rhs: OpMask) -> OpMask {
        OpMask(self.0 | rhs.0)
    }
}

impl BitOrAssign<Op> for OpMask {
    fn bitor_assign(&mut self, rhs: Op) {
        self.0 |= rhs.bit();
    }
}

impl fmt::Display for OpMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.iter().map(Op::name).collect();
        if names.is_empty() {
            f.write_str("-")
        } else {
            f.write_str(&names.join("|"))
        }
    }
}

/// When the push-notification side-channel is told to reload connected
/// browsers.
///
/// - `Always`: after every completed pipeline, whatever its outcome (default).
/// - `OnSuccess`: only after pipelines that ran every command successfully.
/// - `Never`: the side-channel is never poked by pipelines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReloadPolicy {
    #[default]
    Always,
    OnSuccess,
    Never,
}
