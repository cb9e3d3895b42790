//! Lifecycle status derived from a dossier's signature ledger
//!
//! The status is never stored. Every read path recomputes it from the
//! ledger rows, so it always agrees with the signatures on record.

use crate::models::{Acceptance, Caller, DossierStatus, Role, SignatureRecord};

/// Granted signatures needed for a dossier to be released: the receiving
/// worker plus two zone managers.
pub const RELEASE_QUORUM: usize = 3;

/// Count the signers who granted their acceptance
pub fn signed_count(records: &[SignatureRecord]) -> usize {
    records
        .iter()
        .filter(|r| r.accepted == Acceptance::Granted)
        .count()
}

/// Resolve the global status of a dossier from its ledger rows
pub fn resolve(records: &[SignatureRecord]) -> DossierStatus {
    match signed_count(records) {
        0 => DossierStatus::Pending,
        RELEASE_QUORUM => DossierStatus::Released,
        _ => DossierStatus::InProcess,
    }
}

/// Resolve the status as seen by a particular viewer.
///
/// Witnesses only see their own part of the approval: IN_PROCESS once they
/// granted, PENDING otherwise. This view never reports RELEASED.
pub fn resolve_for(records: &[SignatureRecord], viewer: Option<&Caller>) -> DossierStatus {
    match viewer {
        Some(viewer) if viewer.has(Role::Witness) => {
            let own_granted = records
                .iter()
                .any(|r| r.signer_id == viewer.user_id && r.accepted == Acceptance::Granted);
            if own_granted {
                DossierStatus::InProcess
            } else {
                DossierStatus::Pending
            }
        }
        _ => resolve(records),
    }
}
