//! Ordering of promoted packages in the home-page carousel.
use std::collections::{HashMap, HashSet};
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::api::PackageStore;
use crate::model::Package;
use crate::reconcile::CallFailure;
use crate::reconcile::Operation;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CarouselError {
    #[error("package {0} does not exist")]
    Unknown(i64),
    #[error("package {0} is not promoted")]
    NotPromoted(i64),
    #[error("package {0} is listed twice")]
    Duplicate(i64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Assignment {
    pub package_id: i64,
    pub carousel_order: i32,
}

/// Promoted packages in display order: by position, then by id.
pub fn promoted_in_order(packages: &[Package]) -> Vec<&Package> {
    let mut promoted: Vec<&Package> = packages.iter().filter(|p| p.form.promoted).collect();
    promoted.sort_by_key(|p| (p.form.carousel_order, p.id));
    promoted
}

/// Positions 1..n for `ordered_ids`. Promoted packages left out of the list
/// follow at n+1.. in their current order. Only changed positions are kept.
pub fn plan(packages: &[Package], ordered_ids: &[i64]) -> Result<Vec<Assignment>, CarouselError> {
    let by_id: HashMap<i64, &Package> = packages.iter().map(|p| (p.id, p)).collect();
    let mut seen = HashSet::new();
    let mut sequence = Vec::with_capacity(ordered_ids.len());
    for id in ordered_ids {
        let pkg = by_id.get(id).ok_or(CarouselError::Unknown(*id))?;
        if !pkg.form.promoted {
            return Err(CarouselError::NotPromoted(*id));
        }
        if !seen.insert(*id) {
            return Err(CarouselError::Duplicate(*id));
        }
        sequence.push(*pkg);
    }
    sequence.extend(
        promoted_in_order(packages)
            .into_iter()
            .filter(|p| !seen.contains(&p.id)),
    );

    Ok(sequence
        .into_iter()
        .zip(1..)
        .filter(|(pkg, order)| pkg.form.carousel_order != *order)
        .map(|(pkg, order)| Assignment {
            package_id: pkg.id,
            carousel_order: order,
        })
        .collect())
}

/// Send the assignments one by one; failures are logged and returned.
#[instrument(skip_all, fields(count = assignments.len()))]
pub async fn apply(store: &dyn PackageStore, assignments: &[Assignment]) -> Vec<CallFailure> {
    let mut failures = Vec::new();
    for a in assignments {
        match store.set_carousel(a.package_id, true, a.carousel_order).await {
            Ok(()) => info!(package_id = a.package_id, order = a.carousel_order, "carousel position set"),
            Err(err) => {
                warn!(%err, package_id = a.package_id, "failed to set carousel position");
                failures.push(CallFailure {
                    operation: Operation::Update {
                        remote_id: a.package_id,
                    },
                    error: err.to_string(),
                });
            }
        }
    }
    failures
}
