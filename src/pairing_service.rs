//! Pairing business logic: code issuance and confirmation (§4.3)

use rand::Rng;

use crate::db::{DeviceKind, DeviceRepo, Pairing, PairingCode, PairingCodeRepo, PairingRepo};
use crate::{Error, Result};

/// Generate six decimal digits with a cryptographically strong RNG, each
/// drawn independently and uniformly so leading zeros are as likely as any
/// other digit
fn generate_code() -> String {
    let mut rng = rand::thread_rng();
    (0..6).map(|_| rng.gen_range(0..10).to_string()).collect()
}

/// Orchestrates pairing-code issuance and confirmation against the device,
/// pairing-code, and pairing repositories
#[derive(Clone)]
pub struct PairingService {
    devices: DeviceRepo,
    codes: PairingCodeRepo,
    pairings: PairingRepo,
}

impl PairingService {
    /// Construct a pairing service over the given repositories
    #[must_use]
    pub const fn new(devices: DeviceRepo, codes: PairingCodeRepo, pairings: PairingRepo) -> Self {
        Self { devices, codes, pairings }
    }

    /// Issue a fresh pairing code for a host device
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound`/`Forbidden`/`BadRequest` if the host device
    /// does not exist, belong to the account, or have kind host
    pub fn issue_code(&self, account_id: i64, host_device_id: i64) -> Result<PairingCode> {
        self.devices.require_owned(host_device_id, account_id, DeviceKind::Host)?;

        let code = generate_code();
        self.codes.issue(account_id, host_device_id, &code)
    }

    /// Redeem a pairing code, linking the code's host device to a client
    /// device under the same account
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` if the code was never issued, `Error::Gone`
    /// if it is expired or already consumed, `Error::Forbidden` if a
    /// different account is attempting redemption, or device-ownership
    /// errors from [`DeviceRepo::require_owned`]
    pub fn confirm_code(&self, account_id: i64, code: &str, client_device_id: i64) -> Result<Pairing> {
        let record = self
            .codes
            .find_latest_by_code(code)?
            .ok_or_else(|| Error::NotFound("no such pairing code".into()))?;

        if record.account_id != account_id {
            return Err(Error::Forbidden("pairing code belongs to another account".into()));
        }
        if record.consumed {
            return Err(Error::Gone("pairing code already consumed".into()));
        }
        if record.is_expired() {
            return Err(Error::Gone("pairing code expired".into()));
        }

        self.devices
            .require_owned(client_device_id, account_id, DeviceKind::Client)?;

        let pairing = match self.pairings.find(record.host_device_id, client_device_id)? {
            Some(existing) => existing,
            None => self.pairings.create(record.host_device_id, client_device_id)?,
        };

        self.codes.consume(record.id)?;
        Ok(pairing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{init_memory, AccountRepo};

    fn setup() -> (PairingService, AccountRepo, DeviceRepo) {
        let pool = init_memory().unwrap();
        let devices = DeviceRepo::new(pool.clone());
        let codes = PairingCodeRepo::new(pool.clone());
        let pairings = PairingRepo::new(pool.clone());
        (
            PairingService::new(devices.clone(), codes, pairings),
            AccountRepo::new(pool.clone()),
            devices,
        )
    }

    #[test]
    fn test_issue_requires_host_kind() {
        let (service, accounts, devices) = setup();
        let account = accounts.create_with_password("alice", "hash").unwrap();
        let client = devices
            .create(account.id, "phone", DeviceKind::Client)
            .unwrap();

        let err = service.issue_code(account.id, client.id).unwrap_err();
        assert!(matches!(err, Error::BadRequest(_)));
    }

    #[test]
    fn test_confirm_happy_path() {
        let (service, accounts, devices) = setup();
        let account = accounts.create_with_password("alice", "hash").unwrap();
        let host = devices.create(account.id, "host", DeviceKind::Host).unwrap();
        let client = devices
            .create(account.id, "client", DeviceKind::Client)
            .unwrap();

        let code = service.issue_code(account.id, host.id).unwrap();
        let pairing = service.confirm_code(account.id, &code.code, client.id).unwrap();
        assert_eq!(pairing.host_device_id, host.id);
        assert_eq!(pairing.client_device_id, client.id);
    }

    #[test]
    fn test_confirm_is_idempotent() {
        let (service, accounts, devices) = setup();
        let account = accounts.create_with_password("alice", "hash").unwrap();
        let host = devices.create(account.id, "host", DeviceKind::Host).unwrap();
        let client = devices
            .create(account.id, "client", DeviceKind::Client)
            .unwrap();

        let code1 = service.issue_code(account.id, host.id).unwrap();
        let first = service.confirm_code(account.id, &code1.code, client.id).unwrap();

        let code2 = service.issue_code(account.id, host.id).unwrap();
        let second = service.confirm_code(account.id, &code2.code, client.id).unwrap();

        assert_eq!(first.id, second.id);
    }

    #[test]
    fn test_cross_account_redemption_forbidden() {
        let (service, accounts, devices) = setup();
        let alice = accounts.create_with_password("alice", "hash").unwrap();
        let mallory = accounts.create_with_password("mallory", "hash").unwrap();
        let host = devices.create(alice.id, "host", DeviceKind::Host).unwrap();
        let mallory_client = devices
            .create(mallory.id, "phone", DeviceKind::Client)
            .unwrap();

        let code = service.issue_code(alice.id, host.id).unwrap();
        let err = service
            .confirm_code(mallory.id, &code.code, mallory_client.id)
            .unwrap_err();
        assert!(matches!(err, Error::Forbidden(_)));
    }

    #[test]
    fn test_already_consumed_code_rejected() {
        let (service, accounts, devices) = setup();
        let account = accounts.create_with_password("alice", "hash").unwrap();
        let host = devices.create(account.id, "host", DeviceKind::Host).unwrap();
        let client = devices
            .create(account.id, "client", DeviceKind::Client)
            .unwrap();

        let code = service.issue_code(account.id, host.id).unwrap();
        service.confirm_code(account.id, &code.code, client.id).unwrap();

        let second_client = devices
            .create(account.id, "client2", DeviceKind::Client)
            .unwrap();
        let err = service
            .confirm_code(account.id, &code.code, second_client.id)
            .unwrap_err();
        assert!(matches!(err, Error::Gone(_)));
    }

    #[test]
    fn test_unknown_code_not_found() {
        let (service, accounts, devices) = setup();
        let account = accounts.create_with_password("alice", "hash").unwrap();
        let client = devices
            .create(account.id, "client", DeviceKind::Client)
            .unwrap();

        let err = service.confirm_code(account.id, "000000", client.id).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
