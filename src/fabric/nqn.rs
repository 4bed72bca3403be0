//! NQN Derivation
//!
//! NQNs are derived from the backend, the group/pool and the volume name:
//!
//! - LVM:  `<prefix>.<vg>.<lv>`
//! - SPDK: `<prefix>.spdk:<pool>.<lvol>`
//!
//! Components may not contain `.` or `:`, so distinct volumes can never map
//! to the same NQN.

use crate::domain::ports::{Backend, Nqn, VolumeRef};
use crate::error::{Error, Result};

/// Maximum NQN length allowed by the NVMe base specification.
pub const MAX_NQN_LEN: usize = 223;

/// Validate a volume-group, pool or volume name used inside an NQN.
///
/// Allowlist: ASCII alphanumerics, `_` and `-`.
pub fn validate_component(kind: &str, name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidName(format!("{} cannot be empty", kind)));
    }

    if name.starts_with('-') {
        return Err(Error::InvalidName(format!(
            "{} '{}' must not start with '-'",
            kind, name
        )));
    }

    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(Error::InvalidName(format!(
            "invalid characters in {} '{}': only alphanumeric, underscore and hyphen allowed",
            kind, name
        )));
    }

    Ok(())
}

/// Validate an NQN prefix such as `nqn.2022-06.autobench`.
pub fn validate_prefix(prefix: &str) -> Result<()> {
    if !prefix.starts_with("nqn.") {
        return Err(Error::InvalidName(format!(
            "NQN prefix '{}' must start with 'nqn.'",
            prefix
        )));
    }
    if prefix.contains("..")
        || !prefix
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.')
    {
        return Err(Error::InvalidName(format!(
            "NQN prefix '{}' contains invalid characters",
            prefix
        )));
    }
    Ok(())
}

/// Derive the NQN under which a volume is exposed.
pub fn volume_nqn(prefix: &str, volume: &VolumeRef) -> Result<Nqn> {
    validate_prefix(prefix)?;
    validate_component("group", &volume.group)?;
    validate_component("volume name", &volume.name)?;

    let nqn = match volume.backend {
        Backend::Lvm => format!("{}.{}.{}", prefix, volume.group, volume.name),
        Backend::Spdk => format!("{}.spdk:{}.{}", prefix, volume.group, volume.name),
    };

    if nqn.len() > MAX_NQN_LEN {
        return Err(Error::InvalidName(format!(
            "NQN '{}' exceeds maximum length of {} characters",
            nqn, MAX_NQN_LEN
        )));
    }

    Ok(Nqn(nqn))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_NQN_PREFIX;
    use assert_matches::assert_matches;
    use proptest::prelude::*;

    #[test]
    fn test_lvm_nqn() {
        let vol = VolumeRef::new(Backend::Lvm, "vg0", "lv0");
        assert_eq!(
            volume_nqn(DEFAULT_NQN_PREFIX, &vol).unwrap().as_str(),
            "nqn.2022-06.autobench.vg0.lv0"
        );
    }

    #[test]
    fn test_spdk_nqn() {
        let vol = VolumeRef::new(Backend::Spdk, "pool0", "lvol0");
        assert_eq!(
            volume_nqn(DEFAULT_NQN_PREFIX, &vol).unwrap().as_str(),
            "nqn.2022-06.autobench.spdk:pool0.lvol0"
        );
    }

    #[test]
    fn test_backends_never_collide() {
        let lvm = VolumeRef::new(Backend::Lvm, "g", "v");
        let spdk = VolumeRef::new(Backend::Spdk, "g", "v");
        assert_ne!(
            volume_nqn(DEFAULT_NQN_PREFIX, &lvm).unwrap(),
            volume_nqn(DEFAULT_NQN_PREFIX, &spdk).unwrap()
        );
    }

    #[test]
    fn test_rejects_unsafe_components() {
        for (group, name) in [
            ("vg0", ""),
            ("", "lv0"),
            ("vg.0", "lv0"),
            ("vg0", "lv:0"),
            ("vg0", "../etc"),
            ("vg0", "lv 0"),
            ("-vg", "lv0"),
        ] {
            let vol = VolumeRef::new(Backend::Lvm, group, name);
            assert_matches!(
                volume_nqn(DEFAULT_NQN_PREFIX, &vol),
                Err(Error::InvalidName(_)),
                "{group}/{name}"
            );
        }
    }

    #[test]
    fn test_rejects_bad_prefix_and_length() {
        let vol = VolumeRef::new(Backend::Lvm, "vg0", "lv0");
        assert_matches!(volume_nqn("autobench", &vol), Err(Error::InvalidName(_)));
        assert_matches!(volume_nqn("nqn..x", &vol), Err(Error::InvalidName(_)));

        let long = VolumeRef::new(Backend::Lvm, "vg0", "x".repeat(220));
        assert_matches!(volume_nqn(DEFAULT_NQN_PREFIX, &long), Err(Error::InvalidName(_)));
    }

    proptest! {
        #[test]
        fn prop_nqn_is_deterministic_and_injective(
            g1 in "[a-z0-9_-]{1,12}",
            n1 in "[a-z0-9_-]{1,12}",
            g2 in "[a-z0-9_-]{1,12}",
            n2 in "[a-z0-9_-]{1,12}",
        ) {
            prop_assume!(!g1.starts_with('-') && !n1.starts_with('-'));
            prop_assume!(!g2.starts_with('-') && !n2.starts_with('-'));

            let a = VolumeRef::new(Backend::Lvm, g1.clone(), n1.clone());
            let b = VolumeRef::new(Backend::Lvm, g2.clone(), n2.clone());

            let nqn_a = volume_nqn(DEFAULT_NQN_PREFIX, &a).unwrap();
            prop_assert_eq!(&nqn_a, &volume_nqn(DEFAULT_NQN_PREFIX, &a).unwrap());

            let nqn_b = volume_nqn(DEFAULT_NQN_PREFIX, &b).unwrap();
            prop_assert_eq!(nqn_a == nqn_b, g1 == g2 && n1 == n2);
        }
    }
}
