use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

macro_rules! host_id {
    ($name:ident, $repr:ty) => {
        #[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name($repr);

        impl $name {
            pub const fn new(raw: $repr) -> Self {
                Self(raw)
            }

            pub const fn get(self) -> $repr {
                self.0
            }
        }

        impl From<$repr> for $name {
            fn from(raw: $repr) -> Self {
                Self(raw)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = std::num::ParseIntError;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim().parse().map(Self)
            }
        }
    };
}

host_id!(TabId, i64);
host_id!(FrameId, i64);
host_id!(ListenerHandle, u64);

impl TabId {
    /// The host's marker for requests that do not belong to any tab.
    pub const NONE: TabId = TabId(-1);

    pub fn is_none(self) -> bool {
        self.0 < 0
    }
}

impl FrameId {
    /// Frame id of a tab's top-level document.
    pub const TOP_LEVEL: FrameId = FrameId(0);

    pub fn is_top_level(self) -> bool {
        self == Self::TOP_LEVEL
    }
}
