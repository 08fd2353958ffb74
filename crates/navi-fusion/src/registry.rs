//! [`TrackRegistry`] – canonical owner of every live [`FusedTrack`].
//!
//! Besides the tracks themselves the registry keeps two reverse indices,
//! spatial id → key and vision id → key, and refuses any write that would
//! let two live tracks reference the same detection id.  Keys are handed out
//! monotonically and never reused inside one registry, so a removed key can
//! not come back while a stale reference to it may still be around.

use std::collections::{BTreeMap, HashMap};

use navi_types::{FusedTrack, NaviError, SourceKind, TrackKey, TrackKind};

/// Keyed store of live tracks with exactly-once reference indices.
#[derive(Debug, Default)]
pub struct TrackRegistry {
    tracks: BTreeMap<TrackKey, FusedTrack>,
    by_spatial: HashMap<u64, TrackKey>,
    by_vision: HashMap<u64, TrackKey>,
    last_key: u64,
}

impl TrackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve a fresh key.  The key is not registered until a track using
    /// it is [`upsert`](Self::upsert)ed.
    pub fn allocate_key(&mut self) -> TrackKey {
        self.last_key += 1;
        TrackKey(self.last_key)
    }

    /// Insert `track`, or replace the live track with the same key.
    ///
    /// Reference indices are updated to the new spatial/vision refs; refs
    /// the old version held but the new one does not are released.
    ///
    /// # Errors
    ///
    /// Returns [`NaviError::DuplicateReference`] when another live track
    /// already references the same spatial or vision id.  The registry is
    /// left untouched in that case.
    pub fn upsert(&mut self, track: FusedTrack) -> Result<TrackKey, NaviError> {
        let key = track.track_key;
        if let Some(id) = track.spatial_ref
            && let Some(&holder) = self.by_spatial.get(&id)
            && holder != key
        {
            return Err(NaviError::DuplicateReference {
                source_kind: SourceKind::Spatial,
                id,
                holder,
            });
        }
        if let Some(id) = track.vision_ref
            && let Some(&holder) = self.by_vision.get(&id)
            && holder != key
        {
            return Err(NaviError::DuplicateReference {
                source_kind: SourceKind::Vision,
                id,
                holder,
            });
        }

        if let Some(previous) = self.tracks.get(&key) {
            let (old_spatial, old_vision) = (previous.spatial_ref, previous.vision_ref);
            self.unindex(old_spatial, old_vision);
        }
        if let Some(id) = track.spatial_ref {
            self.by_spatial.insert(id, key);
        }
        if let Some(id) = track.vision_ref {
            self.by_vision.insert(id, key);
        }
        self.last_key = self.last_key.max(key.0);
        self.tracks.insert(key, track);
        Ok(key)
    }

    /// # Errors
    ///
    /// Returns [`NaviError::NotFound`] for an unknown key.
    pub fn get(&self, key: TrackKey) -> Result<&FusedTrack, NaviError> {
        self.tracks.get(&key).ok_or(NaviError::NotFound(key))
    }

    /// Remove a track and release its references.
    ///
    /// # Errors
    ///
    /// Returns [`NaviError::NotFound`] for an unknown key.
    pub fn remove(&mut self, key: TrackKey) -> Result<FusedTrack, NaviError> {
        let track = self.tracks.remove(&key).ok_or(NaviError::NotFound(key))?;
        self.unindex(track.spatial_ref, track.vision_ref);
        Ok(track)
    }

    /// Clone of every live track, oldest first (`created_at`, then key).
    pub fn snapshot(&self) -> Vec<FusedTrack> {
        let mut tracks: Vec<FusedTrack> = self.tracks.values().cloned().collect();
        tracks.sort_by(|a, b| {
            a.created_at
                .total_cmp(&b.created_at)
                .then(a.track_key.cmp(&b.track_key))
        });
        tracks
    }

    pub fn by_spatial(&self, spatial_id: u64) -> Option<TrackKey> {
        self.by_spatial.get(&spatial_id).copied()
    }

    pub fn by_vision(&self, vision_id: u64) -> Option<TrackKey> {
        self.by_vision.get(&vision_id).copied()
    }

    pub fn keys(&self) -> Vec<TrackKey> {
        self.tracks.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FusedTrack> {
        self.tracks.values()
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn count_kind(&self, kind: TrackKind) -> usize {
        self.tracks.values().filter(|t| t.kind() == kind).count()
    }

    fn unindex(&mut self, spatial_ref: Option<u64>, vision_ref: Option<u64>) {
        if let Some(id) = spatial_ref {
            self.by_spatial.remove(&id);
        }
        if let Some(id) = vision_ref {
            self.by_vision.remove(&id);
        }
    }
}
