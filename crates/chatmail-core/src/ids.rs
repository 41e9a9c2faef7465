use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! id_type {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord,
            Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(raw: u64) -> Self {
                Self(raw)
            }
        }
    };
}

id_type! {
    /// Account id issued by the core server.
    AccountId
}

id_type! {
    /// Chat id issued by the core server. Zero means "no specific chat".
    ChatId
}

id_type! {
    /// Message id issued by the core server. Zero means "no specific message".
    MsgId
}

id_type! {
    /// Contact id issued by the core server. Zero means "no specific contact".
    ContactId
}

/// The contact representing the account owner.
pub const CONTACT_SELF: ContactId = ContactId(1);

/// Contact ids up to and including this one denote system contacts
/// (self, device, info and friends), not real correspondents.
pub const CONTACT_LAST_SPECIAL: ContactId = ContactId(9);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_serialize_transparently() {
        let id = AccountId(7);
        assert_eq!(serde_json::to_string(&id).unwrap(), "7");
        let back: AccountId = serde_json::from_str("7").unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn special_contact_range() {
        assert!(CONTACT_SELF <= CONTACT_LAST_SPECIAL);
        assert!(ContactId(10) > CONTACT_LAST_SPECIAL);
    }
}
