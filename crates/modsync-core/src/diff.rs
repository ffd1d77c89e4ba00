//! Manifest diffing.
//!
//! Addons are matched by project id within each category. An addon that moves
//! between categories shows up as removed from one and added to the other.

use std::collections::HashMap;

use modsync_backend::{Addon, AddonCategory, Manifest};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddonUpgrade {
    pub name: String,
    pub old_version: String,
    pub new_version: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateDiff {
    pub removed: Vec<String>,
    pub upgraded: Vec<AddonUpgrade>,
    pub added: Vec<String>,
}

impl UpdateDiff {
    #[must_use]
    pub fn has_changes(&self) -> bool {
        self.change_count() > 0
    }

    #[must_use]
    pub fn change_count(&self) -> usize {
        self.removed.len() + self.upgraded.len() + self.added.len()
    }
}

/// Borrowed per-addon view of a diff, for consumers that need the whole addon
/// rather than just its name.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct AddonChanges<'a> {
    pub removed: Vec<(AddonCategory, &'a Addon)>,
    /// `(category, old, new)`
    pub upgraded: Vec<(AddonCategory, &'a Addon, &'a Addon)>,
    pub added: Vec<(AddonCategory, &'a Addon)>,
}

/// Removed and upgraded entries follow the old manifest's order, added entries
/// the new manifest's, and categories are walked in [`AddonCategory::ALL`] order.
#[must_use]
pub fn addon_changes<'a>(old: Option<&'a Manifest>, new: &'a Manifest) -> AddonChanges<'a> {
    let mut changes = AddonChanges::default();

    for category in AddonCategory::ALL {
        let new_addons = new.addons(category);
        let Some(old_manifest) = old else {
            changes
                .added
                .extend(new_addons.iter().map(|addon| (category, addon)));
            continue;
        };
        let old_addons = old_manifest.addons(category);

        let new_by_id = index_by_project(new_addons);
        let old_by_id = index_by_project(old_addons);

        for old_addon in old_addons {
            match new_by_id.get(&old_addon.project_id) {
                None => changes.removed.push((category, old_addon)),
                Some(&new_addon) if new_addon.version != old_addon.version => {
                    changes.upgraded.push((category, old_addon, new_addon));
                }
                Some(_) => {}
            }
        }

        changes.added.extend(
            new_addons
                .iter()
                .filter(|addon| !old_by_id.contains_key(&addon.project_id))
                .map(|addon| (category, addon)),
        );
    }

    changes
}

/// Compute the named diff between an installed manifest (if any) and a new one.
#[must_use]
pub fn diff_manifests(old: Option<&Manifest>, new: &Manifest) -> UpdateDiff {
    let changes = addon_changes(old, new);

    UpdateDiff {
        removed: changes
            .removed
            .iter()
            .map(|(_, addon)| addon.name.clone())
            .collect(),
        upgraded: changes
            .upgraded
            .iter()
            .map(|(_, old_addon, new_addon)| AddonUpgrade {
                name: new_addon.name.clone(),
                old_version: old_addon.version.clone(),
                new_version: new_addon.version.clone(),
            })
            .collect(),
        added: changes
            .added
            .iter()
            .map(|(_, addon)| addon.name.clone())
            .collect(),
    }
}

// Duplicate project ids within a category resolve to the first occurrence.
fn index_by_project(addons: &[Addon]) -> HashMap<u64, &Addon> {
    let mut by_id = HashMap::with_capacity(addons.len());
    for addon in addons {
        by_id.entry(addon.project_id).or_insert(addon);
    }
    by_id
}
