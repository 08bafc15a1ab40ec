use serde::{Deserialize, Serialize};

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl $name {
            #[inline]
            pub fn get(self) -> u64 {
                self.0
            }
        }

        impl From<u64> for $name {
            #[inline]
            fn from(raw: u64) -> Self {
                Self(raw)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

id_type!(
    /// Producer-assigned fiber identifier. Unique for the session, never reused.
    FiberId
);

id_type!(
    /// Render pass identifier, monotonic per session.
    CommitId
);

id_type!(
    /// Structured event identifier, monotonic and unique across the session.
    MessageId
);

id_type!(
    /// Identifier the hook assigns to an injected renderer.
    RendererId
);

impl FiberId {
    /// Map the wire convention (`0` = no fiber) to an `Option`.
    #[inline]
    pub fn from_wire(raw: u64) -> Option<Self> {
        (raw != 0).then_some(Self(raw))
    }
}

impl MessageId {
    #[inline]
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}
