//! Turns paint attempts into store writes and remote values into grid changes.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde_json::Value;

use crate::boundary::Region;
use crate::colors::Color;
use crate::config::GameConfig;
use crate::cooldown::remaining_secs;
use crate::grid::{CellChange, GridState};
use crate::session::LocalSession;
use crate::store::{
    ClaimRecord, GridKey, PathError, StoreCommand, decode_claims, paint_time_path, pixels_path,
    presence_counts, presence_path,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaintError {
    NoRegion,
    NotAuthenticated,
    Cooldown { remaining_secs: i64 },
}

impl fmt::Display for PaintError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoRegion => write!(f, "Choose a region before painting"),
            Self::NotAuthenticated => write!(f, "Sign in to paint"),
            Self::Cooldown { remaining_secs } => write!(f, "Wait {remaining_secs} more seconds"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaintOutcome {
    Painted(GridKey),
    /// The cell is outside every region.
    Unclaimable,
    /// The cell already has the caller's color.
    AlreadyOwned,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinError {
    UnknownRegion(String),
    InvalidName(PathError),
}

impl fmt::Display for JoinError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownRegion(name) => write!(f, "Unknown region {name:?}"),
            Self::InvalidName(e) => write!(f, "Region cannot be joined: {e}"),
        }
    }
}

/// Grid changes produced by one remote `pixels` value.
#[derive(Debug, Default, PartialEq)]
pub struct RemoteClaims {
    pub changed: Vec<GridKey>,
    /// The whole grid went back to its base (remote reset).
    pub reset: bool,
    /// Keys or bodies that didn't decode, plus keys outside the grid.
    pub dropped: usize,
}

pub struct SyncEngine {
    cooldown_ms: i64,
    require_auth: bool,
    session: LocalSession,
    user: Option<String>,
    region_colors: HashMap<String, Color>,
    presence: BTreeMap<String, usize>,
    outbox: Vec<StoreCommand>,
    session_dirty: bool,
}

impl SyncEngine {
    pub fn new(config: &GameConfig, session: LocalSession) -> Self {
        Self {
            cooldown_ms: config.cooldown_ms,
            require_auth: config.require_auth,
            session,
            user: None,
            region_colors: HashMap::new(),
            presence: BTreeMap::new(),
            outbox: Vec::new(),
            session_dirty: false,
        }
    }

    /// Register the loaded regions. A saved region gets its color re-derived;
    /// one the dataset no longer has is dropped along with its color.
    pub fn set_regions(&mut self, regions: &[Region]) {
        self.region_colors = regions.iter().map(|r| (r.name.clone(), r.color)).collect();
        let Some(region) = self.session.region.as_deref() else {
            return;
        };
        let color = self.region_colors.get(region).copied();
        if color.is_none() {
            self.session.region = None;
        }
        if self.session.color != color || color.is_none() {
            self.session.color = color;
            self.session_dirty = true;
        }
    }

    pub fn session(&self) -> &LocalSession {
        &self.session
    }

    pub fn selected_region(&self) -> Option<&str> {
        self.session.region.as_deref()
    }

    pub fn selected_color(&self) -> Option<Color> {
        self.session.color
    }

    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    pub fn set_user(&mut self, user: Option<String>) {
        self.user = user;
    }

    /// Affiliate this client with `name`, moving its presence marker.
    pub fn join_region(&mut self, name: &str) -> Result<(), JoinError> {
        let color = *self
            .region_colors
            .get(name)
            .ok_or_else(|| JoinError::UnknownRegion(name.to_string()))?;
        let path = presence_path(name, &self.session.client_id).map_err(JoinError::InvalidName)?;

        if let Some(old) = self.session.region.as_deref()
            && old != name
            && let Ok(old_path) = presence_path(old, &self.session.client_id)
        {
            self.outbox.push(StoreCommand::Remove { path: old_path });
        }
        self.outbox.push(StoreCommand::RemoveOnDisconnect { path: path.clone() });
        self.outbox.push(StoreCommand::Write {
            path,
            value: Value::Bool(true),
        });

        self.session.region = Some(name.to_string());
        self.session.color = Some(color);
        self.session_dirty = true;
        Ok(())
    }

    /// Re-register presence for a region restored from the saved session.
    pub fn restore_region(&mut self) -> Option<Result<(), JoinError>> {
        let region = self.session.region.clone()?;
        Some(self.join_region(&region))
    }

    pub fn apply_presence(&mut self, value: &Value) {
        self.presence = presence_counts(value);
    }

    pub fn presence_count(&self, region: &str) -> usize {
        self.presence.get(region).copied().unwrap_or(0)
    }

    pub fn presence(&self) -> &BTreeMap<String, usize> {
        &self.presence
    }

    pub fn last_paint_ms(&self) -> Option<i64> {
        self.session.last_paint_ms
    }

    pub fn cooldown_remaining_ms(&self, now_ms: i64) -> i64 {
        self.session
            .last_paint_ms
            .map_or(0, |last| {
                last.saturating_add(self.cooldown_ms)
                    .saturating_sub(now_ms)
                    .max(0)
            })
    }

    /// Attempt to claim `(x, y)` at `now_ms`. Errors leave every piece of state untouched.
    pub fn try_paint(
        &mut self,
        grid: &mut GridState,
        x: u32,
        y: u32,
        now_ms: i64,
    ) -> Result<PaintOutcome, PaintError> {
        let (Some(region), Some(color)) = (self.session.region.clone(), self.session.color) else {
            return Err(PaintError::NoRegion);
        };
        if self.require_auth && self.user.is_none() {
            return Err(PaintError::NotAuthenticated);
        }
        let remaining = self.cooldown_remaining_ms(now_ms);
        if remaining > 0 {
            return Err(PaintError::Cooldown {
                remaining_secs: remaining_secs(remaining),
            });
        }
        if !grid.is_paintable(x, y) {
            return Ok(PaintOutcome::Unclaimable);
        }
        if grid.get(x, y) == Some(color) {
            return Ok(PaintOutcome::AlreadyOwned);
        }

        let key = GridKey::new(x, y);
        let record = ClaimRecord::new(color, region, self.user.clone());
        self.outbox.push(StoreCommand::Write {
            path: key.path(),
            value: record.to_wire(),
        });
        grid.apply_claim(key, record);

        self.session.last_paint_ms = Some(now_ms);
        self.session_dirty = true;
        if let Some(user) = self.user.as_deref()
            && let Ok(path) = paint_time_path(user)
        {
            self.outbox.push(StoreCommand::Write {
                path,
                value: Value::from(now_ms),
            });
        }
        Ok(PaintOutcome::Painted(key))
    }

    /// Merge the full value seen at `pixels` into the grid.
    ///
    /// `null` means the subtree was removed: the grid returns to its base.
    pub fn apply_remote_claims(&mut self, grid: &mut GridState, value: &Value) -> RemoteClaims {
        let mut result = RemoteClaims::default();
        if value.is_null() {
            if grid.claim_count() > 0 {
                grid.reset_all();
                result.reset = true;
            }
            return result;
        }

        let snapshot = decode_claims(value);
        result.dropped = snapshot.malformed;

        let gone: Vec<GridKey> = grid
            .claims()
            .map(|(k, _)| *k)
            .filter(|k| !snapshot.claims.contains_key(k))
            .collect();
        for key in gone {
            if let CellChange::Cell(k) = grid.clear_claim(key) {
                result.changed.push(k);
            }
        }

        let dims = grid.dims();
        for (key, record) in snapshot.claims {
            if !dims.contains(key.x, key.y) {
                result.dropped += 1;
                continue;
            }
            if let CellChange::Cell(k) = grid.apply_claim(key, record) {
                result.changed.push(k);
            }
        }
        result
    }

    /// Adopt a later paint time seen at `paintTimes/{user}`. Returns true when it moved.
    ///
    /// Values that aren't epoch millis, or that lie more than one cooldown
    /// ahead of `now_ms`, are ignored.
    pub fn apply_remote_paint_time(&mut self, value: &Value, now_ms: i64) -> bool {
        let Some(remote) = remote_millis(value) else {
            return false;
        };
        if remote > now_ms.saturating_add(self.cooldown_ms) {
            return false;
        }
        if self.session.last_paint_ms.is_some_and(|local| local >= remote) {
            return false;
        }
        self.session.last_paint_ms = Some(remote);
        self.session_dirty = true;
        true
    }

    /// Remove every claim from the store, then drop the local cache.
    pub fn reset(&mut self, grid: &mut GridState) {
        self.outbox.push(StoreCommand::Remove {
            path: pixels_path(),
        });
        grid.reset_all();
    }

    pub fn pending_commands(&self) -> &[StoreCommand] {
        &self.outbox
    }

    pub fn take_commands(&mut self) -> Vec<StoreCommand> {
        std::mem::take(&mut self.outbox)
    }

    /// The session to persist, if it changed since the last call.
    pub fn take_session_changed(&mut self) -> Option<LocalSession> {
        if !std::mem::take(&mut self.session_dirty) {
            return None;
        }
        Some(self.session.clone())
    }
}

/// Non-negative integral millis; floats only when finite and whole.
fn remote_millis(value: &Value) -> Option<i64> {
    if let Some(ms) = value.as_i64() {
        return (ms >= 0).then_some(ms);
    }
    let ms = value.as_f64()?;
    if !ms.is_finite() || ms < 0.0 || ms.fract() != 0.0 || ms >= i64::MAX as f64 {
        return None;
    }
    Some(ms as i64)
}
