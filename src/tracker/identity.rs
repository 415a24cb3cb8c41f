use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use tracing::error;
use uuid::Uuid;

use super::configuration::Configuration;
use crate::reliability::Preferences;

pub const USER_ID_KEY: &str = "idclient";
pub const OPT_OUT: &str = "opt-out";
const HASH_SALT: &str = "AT";

/// Resolves the visitor id sent as `idclient`.
#[derive(Clone)]
pub struct UserIdentity {
    preferences: Preferences,
    configuration: Arc<RwLock<Configuration>>,
    do_not_track: Arc<AtomicBool>,
}

impl UserIdentity {
    pub fn new(
        preferences: Preferences,
        configuration: Arc<RwLock<Configuration>>,
        do_not_track: Arc<AtomicBool>,
    ) -> Self {
        Self {
            preferences,
            configuration,
            do_not_track,
        }
    }

    /// `opt-out` under do-not-track, otherwise the stored UUID, hashed when
    /// `hashUserId` is set. The UUID is created on first use.
    pub fn user_id(&self) -> String {
        if self.do_not_track.load(Ordering::SeqCst) {
            return OPT_OUT.to_string();
        }

        let id = match self
            .preferences
            .get_or_insert_with(USER_ID_KEY, || Uuid::new_v4().to_string())
        {
            Ok(id) => id,
            Err(e) => {
                error!("Could not persist visitor id, using a transient one: {}", e);
                Uuid::new_v4().to_string()
            }
        };

        if self.configuration.read().hash_user_id() {
            hash_user_id(&id)
        } else {
            id
        }
    }
}

pub fn hash_user_id(id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(HASH_SALT.as_bytes());
    hasher.update(id.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reliability::OfflineStorage;
    use crate::tracker::configuration::HASH_USER_ID;

    fn identity() -> (UserIdentity, Arc<RwLock<Configuration>>, Arc<AtomicBool>) {
        let storage = OfflineStorage::temporary().unwrap();
        let configuration = Arc::new(RwLock::new(Configuration::default()));
        let dnt = Arc::new(AtomicBool::new(false));
        let identity = UserIdentity::new(storage.preferences().unwrap(), configuration.clone(), dnt.clone());
        (identity, configuration, dnt)
    }

    #[test]
    fn test_id_is_stable_across_calls() {
        let (identity, _, _) = identity();
        let first = identity.user_id();
        assert!(Uuid::parse_str(&first).is_ok());
        assert_eq!(identity.user_id(), first);
    }

    #[test]
    fn test_hashing_and_opt_out() {
        let (identity, configuration, dnt) = identity();
        let raw = identity.user_id();

        configuration.write().set(HASH_USER_ID, "true").unwrap();
        let hashed = identity.user_id();
        assert_eq!(hashed, hash_user_id(&raw));
        assert_eq!(hashed.len(), 64);

        dnt.store(true, Ordering::SeqCst);
        assert_eq!(identity.user_id(), OPT_OUT);
    }

    #[test]
    fn test_known_hash() {
        // sha256("ATabc")
        assert_eq!(
            hash_user_id("abc"),
            hex::encode(Sha256::digest(b"ATabc"))
        );
    }
}
