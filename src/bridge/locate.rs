//! Finding the map feature behind an editor id.
//!
//! No single id source is trusted: the engine uid, the engine feature id and
//! the `@_fid`/`id` properties each hold the "real" id on some server.

use std::collections::HashSet;

use crate::identity::{id_aliases, FeatureId};

use super::port::{LayerKind, MapFeature, MapPort};

fn uid_matches(uid: &str, aliases: &[String]) -> bool {
    aliases.iter().any(|alias| {
        uid == alias
            || uid
                .strip_suffix(alias.as_str())
                .is_some_and(|head| head.ends_with(['.', ':', '_', '-']))
    })
}

/// Locate `id` on `layer`: uid exact/suffix match, then the engine feature
/// id, then the `@_fid`/`id` properties.
pub fn locate_feature(port: &dyn MapPort, layer: LayerKind, id: &FeatureId) -> Option<MapFeature> {
    let aliases = id.aliases();
    let features = port.features(layer);

    if let Some(f) = features.iter().find(|f| uid_matches(&f.uid, &aliases)) {
        return Some(f.clone());
    }
    for alias in &aliases {
        if let Some(f) = port.feature_by_id(layer, alias) {
            return Some(f);
        }
    }
    let wanted: HashSet<&str> = aliases.iter().map(String::as_str).collect();
    features.into_iter().find(|f| {
        f.id_candidates()
            .iter()
            .flat_map(id_aliases)
            .any(|a| wanted.contains(a.as_str()))
    })
}
