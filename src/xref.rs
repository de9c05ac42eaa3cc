//! Cross-reference synthesis.

use crate::{Address, ProgramDb, RefKind, Reference, Region, TOOL_NAME};

/// Record a recovered data reference from `site` to `region:offset`.
///
/// The reference carries user-defined provenance and weight 1, matching what
/// a manual annotation would look like in the listing. References are unique
/// per `(from, to, kind)`: if an equal edge already exists nothing is
/// appended, which keeps reruns of the whole batch idempotent.
///
/// Returns the appended reference, or `None` if it was a duplicate.
pub fn synthesize(
    db: &mut dyn ProgramDb,
    site: Address,
    offset: u64,
    region: Region,
) -> Option<Reference> {
    let target = Address::new(region, offset);
    let reference = Reference::data(site, target);

    let duplicate = db
        .references_to(target)
        .iter()
        .any(|existing| existing.from == site && existing.kind == RefKind::Data);
    if duplicate {
        log::debug!(
            "{}> Reference from {} to {} already exists, skipping.",
            TOOL_NAME,
            site,
            target
        );
        return None;
    }

    db.add_reference(reference);
    log::info!(
        "{}> Added reference from {} to {}.",
        TOOL_NAME,
        site,
        target
    );

    Some(reference)
}
