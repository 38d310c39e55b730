use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::input::ResolvedTrack;

use super::RoomError;

pub type TrackId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteDirection {
    Up,
    Down,
}

impl VoteDirection {
    fn delta(self) -> i32 {
        match self {
            Self::Up => 1,
            Self::Down => -1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionMode {
    Auto,
    Manual,
}

/// A queued or pending media reference with its voting state
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    pub id: TrackId,
    pub video_id: String,
    pub title: String,
    pub channel: String,
    pub thumbnail: String,
    /// Duration in seconds. Clients may correct this later via
    /// [RoomState::update_duration].
    pub duration: u32,
    pub score: i32,
    /// Current vote per voting identity. The score is always the sum
    /// of these contributions.
    pub votes: HashMap<String, VoteDirection>,
    pub suggested_by: Suggester,
    pub is_owner_priority: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Suggester {
    pub user_id: Option<String>,
    pub display_name: String,
}

/// A previously played track. Feeds the duplicate cooldown, the
/// library view, and auto-refill.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub video_id: String,
    pub title: String,
    pub channel: String,
    pub thumbnail: String,
    pub duration: u32,
    pub played_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub suggestions_enabled: bool,
    pub music_only: bool,
    /// Longest allowed track in seconds, 0 disables the limit
    pub max_duration: u32,
    /// 0 disables the limit
    pub max_queue_size: u32,
    /// How many recent history entries block a repeat, 0 disables
    pub duplicate_cooldown: u32,
    pub smart_queue: bool,
    pub auto_refill: bool,
    pub playlist_view_mode: bool,
    pub allow_prelisten: bool,
    pub votes_enabled: bool,
    pub owner_bypass: bool,
    pub owner_queue_bypass: bool,
    pub owner_popups: bool,
    pub suggestion_mode: SuggestionMode,
    pub auto_approve_known: bool,
    pub captions_enabled: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            suggestions_enabled: true,
            music_only: false,
            max_duration: 0,
            max_queue_size: 0,
            duplicate_cooldown: 0,
            smart_queue: false,
            auto_refill: false,
            playlist_view_mode: false,
            allow_prelisten: true,
            votes_enabled: true,
            owner_bypass: true,
            owner_queue_bypass: false,
            owner_popups: true,
            suggestion_mode: SuggestionMode::Auto,
            auto_approve_known: false,
            captions_enabled: false,
        }
    }
}

/// A partial settings update. Absent keys leave the current value
/// untouched.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsPatch {
    pub suggestions_enabled: Option<bool>,
    pub music_only: Option<bool>,
    pub max_duration: Option<u32>,
    pub max_queue_size: Option<u32>,
    pub duplicate_cooldown: Option<u32>,
    pub smart_queue: Option<bool>,
    pub auto_refill: Option<bool>,
    pub playlist_view_mode: Option<bool>,
    pub allow_prelisten: Option<bool>,
    pub votes_enabled: Option<bool>,
    pub owner_bypass: Option<bool>,
    pub owner_queue_bypass: Option<bool>,
    pub owner_popups: Option<bool>,
    pub suggestion_mode: Option<SuggestionMode>,
    pub auto_approve_known: Option<bool>,
    pub captions_enabled: Option<bool>,
}

impl Settings {
    pub fn apply(&mut self, patch: SettingsPatch) {
        macro_rules! merge {
            ($($field:ident),*) => {
                $(if let Some(value) = patch.$field {
                    self.$field = value;
                })*
            };
        }

        merge!(
            suggestions_enabled,
            music_only,
            max_duration,
            max_queue_size,
            duplicate_cooldown,
            smart_queue,
            auto_refill,
            playlist_view_mode,
            allow_prelisten,
            votes_enabled,
            owner_bypass,
            owner_queue_bypass,
            owner_popups,
            suggestion_mode,
            auto_approve_known,
            captions_enabled
        );
    }
}

/// What happened to an accepted suggestion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuggestOutcome {
    /// The track went straight into the queue
    Queued,
    /// The track awaits the owner's decision
    Pending,
}

/// The live state of one room: queue, playback clock, moderation and
/// history. Owned exclusively by the room actor, so every method here
/// runs serialized.
#[derive(Debug)]
pub struct RoomState {
    next_track_id: TrackId,
    pub queue: Vec<Track>,
    /// Elapsed seconds into the current track
    pub progress: u32,
    pub is_playing: bool,
    pub pending_suggestions: Vec<Track>,
    pub banned_video_ids: HashSet<String>,
    /// Video ids that made it into the queue before, used by the
    /// auto-approve-known setting
    pub approved_video_ids: HashSet<String>,
    pub history: Vec<HistoryEntry>,
    pub settings: Settings,
}

impl Default for RoomState {
    fn default() -> Self {
        Self::new()
    }
}

impl RoomState {
    pub fn new() -> Self {
        Self {
            next_track_id: 1,
            queue: Vec::new(),
            progress: 0,
            is_playing: false,
            pending_suggestions: Vec::new(),
            banned_video_ids: HashSet::new(),
            approved_video_ids: HashSet::new(),
            history: Vec::new(),
            settings: Settings::default(),
        }
    }

    pub fn current(&self) -> Option<&Track> {
        self.queue.first()
    }

    fn mint_track(
        &mut self,
        resolved: &ResolvedTrack,
        suggested_by: Suggester,
        is_owner_priority: bool,
    ) -> Track {
        let id = self.next_track_id;
        self.next_track_id += 1;

        Track {
            id,
            video_id: resolved.video_id.clone(),
            title: resolved.title.clone(),
            channel: resolved.channel.clone(),
            thumbnail: resolved.thumbnail.clone(),
            duration: resolved.duration,
            score: 0,
            votes: HashMap::new(),
            suggested_by,
            is_owner_priority,
        }
    }

    /// Applies a vote with toggle semantics: repeating a vote retracts
    /// it, reversing a vote swings the score by two.
    pub fn vote(
        &mut self,
        client_id: &str,
        track_id: TrackId,
        direction: VoteDirection,
    ) -> Result<(), RoomError> {
        if !self.settings.votes_enabled {
            return Err(RoomError::VotesDisabled);
        }

        if self.current().is_some_and(|t| t.id == track_id) {
            return Err(RoomError::CurrentTrackVote);
        }

        let track = self
            .queue
            .iter_mut()
            .find(|t| t.id == track_id)
            .ok_or(RoomError::TrackNotFound)?;

        match track.votes.get(client_id).copied() {
            Some(existing) if existing == direction => {
                track.votes.remove(client_id);
                track.score -= direction.delta();
            }
            Some(_) => {
                track.votes.insert(client_id.to_string(), direction);
                track.score += direction.delta() * 2;
            }
            None => {
                track.votes.insert(client_id.to_string(), direction);
                track.score += direction.delta();
            }
        }

        self.resort();
        Ok(())
    }

    /// Reorders everything behind the current track by descending
    /// score. The sort is stable so equal scores keep their relative
    /// order, and owner-priority tracks stay ahead of the scored
    /// segment untouched.
    fn resort(&mut self) {
        if self.queue.len() <= 2 {
            return;
        }

        let rest = self.queue.split_off(1);
        let (priority, mut scored): (Vec<_>, Vec<_>) =
            rest.into_iter().partition(|t| t.is_owner_priority);

        scored.sort_by_key(|t| std::cmp::Reverse(t.score));

        self.queue.extend(priority);
        self.queue.extend(scored);
    }

    /// Runs the moderation pipeline for an already-resolved suggestion.
    pub fn suggest(
        &mut self,
        resolved: &ResolvedTrack,
        suggested_by: Suggester,
        is_owner: bool,
    ) -> Result<SuggestOutcome, RoomError> {
        if self.banned_video_ids.contains(&resolved.video_id) {
            return Err(RoomError::Banned);
        }

        if !self.settings.suggestions_enabled && !is_owner {
            return Err(RoomError::SuggestionsDisabled);
        }

        let priority = is_owner && self.settings.owner_queue_bypass;

        // The owner bypass skips both the policy limits and moderation
        if is_owner && self.settings.owner_bypass {
            let track = self.mint_track(resolved, suggested_by, priority);
            self.admit(track)?;
            return Ok(SuggestOutcome::Queued);
        }

        if self.settings.music_only && !resolved.is_music {
            return Err(RoomError::NotMusic);
        }

        if self.settings.max_duration != 0 && resolved.duration > self.settings.max_duration {
            return Err(RoomError::TooLong);
        }

        let cooldown = self.settings.duplicate_cooldown as usize;
        if cooldown != 0
            && self
                .history
                .iter()
                .rev()
                .take(cooldown)
                .any(|e| e.video_id == resolved.video_id)
        {
            return Err(RoomError::RecentlyPlayed);
        }

        let known = self.settings.auto_approve_known
            && self.approved_video_ids.contains(&resolved.video_id);

        if self.settings.suggestion_mode == SuggestionMode::Auto || known {
            let track = self.mint_track(resolved, suggested_by, priority);
            self.admit(track)?;
            return Ok(SuggestOutcome::Queued);
        }

        let track = self.mint_track(resolved, suggested_by, false);
        self.pending_suggestions.push(track);
        Ok(SuggestOutcome::Pending)
    }

    /// Inserts an approved track, enforcing the queue capacity and the
    /// smart-queue eviction policy.
    fn admit(&mut self, track: Track) -> Result<(), RoomError> {
        let max = self.settings.max_queue_size as usize;

        if max != 0 && self.queue.len() >= max {
            if !self.settings.smart_queue {
                return Err(RoomError::QueueFull);
            }

            // The first lowest-scoring non-priority track, evictable
            // only when its score is strictly negative
            let mut evict: Option<(usize, i32)> = None;
            for (index, candidate) in self.queue.iter().enumerate() {
                if candidate.is_owner_priority {
                    continue;
                }

                if evict.map_or(true, |(_, score)| candidate.score < score) {
                    evict = Some((index, candidate.score));
                }
            }

            match evict {
                Some((index, score)) if score < 0 => {
                    self.queue.remove(index);
                    if index == 0 {
                        self.progress = 0;
                    }
                }
                _ => return Err(RoomError::QueueFull),
            }
        }

        self.approved_video_ids.insert(track.video_id.clone());

        let was_empty = self.queue.is_empty();

        if track.is_owner_priority && !was_empty {
            self.queue.insert(1, track);
        } else {
            self.queue.push(track);
        }

        if was_empty {
            self.progress = 0;
            self.is_playing = true;
        }

        Ok(())
    }

    /// Moves a pending suggestion into the queue. On a full queue the
    /// suggestion stays pending.
    pub fn approve(&mut self, track_id: TrackId) -> Result<(), RoomError> {
        let index = self
            .pending_suggestions
            .iter()
            .position(|t| t.id == track_id)
            .ok_or(RoomError::TrackNotFound)?;

        let track = self.pending_suggestions.remove(index);

        if let Err(error) = self.admit(track.clone()) {
            self.pending_suggestions.insert(index, track);
            return Err(error);
        }

        Ok(())
    }

    pub fn reject(&mut self, track_id: TrackId) -> Result<(), RoomError> {
        let index = self
            .pending_suggestions
            .iter()
            .position(|t| t.id == track_id)
            .ok_or(RoomError::TrackNotFound)?;

        self.pending_suggestions.remove(index);
        Ok(())
    }

    /// Bans the track's video id and purges every queued or pending
    /// occurrence of it in the same step.
    pub fn ban(&mut self, track_id: TrackId) -> Result<(), RoomError> {
        let video_id = self
            .pending_suggestions
            .iter()
            .chain(self.queue.iter())
            .find(|t| t.id == track_id)
            .map(|t| t.video_id.clone())
            .ok_or(RoomError::TrackNotFound)?;

        self.banned_video_ids.insert(video_id.clone());
        self.purge(&video_id);
        Ok(())
    }

    pub fn unban(&mut self, video_id: &str) {
        self.banned_video_ids.remove(video_id);
    }

    fn purge(&mut self, video_id: &str) {
        self.pending_suggestions.retain(|t| t.video_id != video_id);

        let head = self.current().map(|t| t.id);
        self.queue.retain(|t| t.video_id != video_id);

        if self.current().map(|t| t.id) != head {
            self.progress = 0;

            if self.queue.is_empty() {
                self.is_playing = false;
            }
        }
    }

    /// Advances the playback clock by one second. Returns whether the
    /// state changed and a broadcast is due.
    pub fn tick(&mut self) -> bool {
        if !self.is_playing {
            return false;
        }

        let Some(current) = self.current() else {
            return false;
        };

        let duration = current.duration;
        self.progress += 1;

        if self.progress > duration {
            self.advance();
        }

        true
    }

    /// Dequeues the current track into history and promotes the next
    /// entry.
    fn advance(&mut self) {
        if self.queue.is_empty() {
            return;
        }

        let finished = self.queue.remove(0);
        self.history.push(HistoryEntry {
            video_id: finished.video_id,
            title: finished.title,
            channel: finished.channel,
            thumbnail: finished.thumbnail,
            duration: finished.duration,
            played_at: Utc::now(),
        });

        self.progress = 0;

        if self.queue.is_empty() {
            if self.settings.auto_refill {
                self.refill();
            }

            if self.queue.is_empty() {
                self.is_playing = false;
            }
        }
    }

    /// Requeues the history entry whose most recent play is longest
    /// ago. History itself is never drained by this.
    fn refill(&mut self) {
        let mut latest_play: HashMap<&str, DateTime<Utc>> = HashMap::new();

        for entry in &self.history {
            let at = latest_play
                .entry(entry.video_id.as_str())
                .or_insert(entry.played_at);

            if entry.played_at > *at {
                *at = entry.played_at;
            }
        }

        let pick = latest_play
            .into_iter()
            .filter(|(id, _)| !self.banned_video_ids.contains(*id))
            .min_by_key(|(_, at)| *at)
            .map(|(id, _)| id.to_string());

        let Some(video_id) = pick else { return };

        let Some(entry) = self
            .history
            .iter()
            .rev()
            .find(|e| e.video_id == video_id)
            .cloned()
        else {
            return;
        };

        let id = self.next_track_id;
        self.next_track_id += 1;

        self.queue.push(Track {
            id,
            video_id: entry.video_id,
            title: entry.title,
            channel: entry.channel,
            thumbnail: entry.thumbnail,
            duration: entry.duration,
            score: 0,
            votes: HashMap::new(),
            suggested_by: Suggester {
                user_id: None,
                display_name: "Autoplay".to_string(),
            },
            is_owner_priority: false,
        });
    }

    pub fn set_playing(&mut self, playing: bool) {
        self.is_playing = playing;
    }

    /// Applies immediately rather than waiting for the next tick
    pub fn seek(&mut self, seconds: u32) {
        if let Some(current) = self.current() {
            self.progress = seconds.min(current.duration);
        }
    }

    /// Removing the current track behaves like an auto-advance,
    /// removing any other entry leaves the rest of the order alone.
    pub fn delete_track(&mut self, track_id: TrackId) -> Result<(), RoomError> {
        if self.current().is_some_and(|t| t.id == track_id) {
            self.advance();
            return Ok(());
        }

        let index = self
            .queue
            .iter()
            .position(|t| t.id == track_id)
            .ok_or(RoomError::TrackNotFound)?;

        self.queue.remove(index);
        Ok(())
    }

    /// Clients report the playback surface's authoritative duration
    /// when the resolver's estimate proves wrong.
    pub fn update_duration(&mut self, seconds: u32) {
        if let Some(current) = self.queue.first_mut() {
            current.duration = seconds;
        }

        if let Some(current) = self.current() {
            self.progress = self.progress.min(current.duration);
        }
    }

    /// Erases a video from the library view, which also hides it from
    /// auto-refill.
    pub fn remove_from_library(&mut self, video_id: &str) {
        self.history.retain(|e| e.video_id != video_id);
    }

    pub fn update_settings(&mut self, patch: SettingsPatch) {
        self.settings.apply(patch);
    }
}
