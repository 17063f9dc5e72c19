//! The canvas engine: confirmed-stream ingestion, local fork reconciliation,
//! snapshots, recording and playback.
//!
//! One `CanvasEngine` holds everything a participant knows about a session.
//! Confirmed commands from the server go through [`CanvasEngine::handle_commands`];
//! the local user's unconfirmed strokes go through
//! [`CanvasEngine::handle_local_commands`] and live in the fork until the
//! server echoes them back. The visible state (`doc`) always shows confirmed
//! history plus pending local predictions; the fork checkpoint preserves the
//! purely confirmed state for reconciliation and snapshots.

#[cfg(test)]
#[path = "engine_test.rs"]
mod engine_test;

use std::collections::VecDeque;
use std::path::Path;
use std::time::Instant;

use commands::{Command, Payload, Rect, UserId};
use replay::{PlayError, Player, RecordError, Recorder};
use tracing::{error, info, warn};

use crate::acl::AclState;
use crate::doc::{CanvasEffect, CanvasState, Size, StructuralError};
use crate::event::{Event, EventQueue};
use crate::fork::{ForkEntryState, LocalFork};
use crate::models::{DocumentMetadata, LayerList, Timeline, UserList};
use crate::snapshot::{generate_snapshot, AclMask};

/// Engine construction parameters, consumed once.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// User id whose commands are treated as local predictions.
    pub local_user: UserId,
    /// Refresh rate hint for the embedding renderer, exposed via
    /// [`CanvasEngine::config`]. The engine itself has no frame clock.
    pub fps: i32,
    /// Savepoint retention: how many rollback points to keep. Zero disables
    /// savepoints entirely.
    pub snapshot_max_count: usize,
    /// Savepoint retention: minimum spacing between automatic captures.
    pub snapshot_min_delay_ms: i64,
    /// Whether new recordings start with a full-state dump.
    pub want_history_dump: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            local_user: 1,
            fps: 60,
            snapshot_max_count: 5,
            snapshot_min_delay_ms: 10_000,
            want_history_dump: false,
        }
    }
}

/// Where and why a batch stopped early.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchFailure {
    /// Index of the failing command within the submitted batch.
    pub index: usize,
    pub error: StructuralError,
}

/// Result of feeding a batch of commands to the engine.
///
/// `applied` counts commands that changed state; rejected commands are
/// skipped without counting and without stopping the batch. A structural
/// `failure` halts the batch at its index; everything before it stays
/// applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchOutcome {
    pub applied: usize,
    pub failure: Option<BatchFailure>,
}

impl BatchOutcome {
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.failure.is_none()
    }
}

/// A rollback point: the full confirmed session state at a stream position.
struct Savepoint {
    seq: u64,
    doc: CanvasState,
    acl: AclState,
    users: UserList,
    layer_list: LayerList,
    timeline: Timeline,
    metadata: DocumentMetadata,
}

/// Outcome of one playback step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackProgress {
    /// This many commands were played.
    Played(usize),
    /// The recording ended cleanly; the player has been released.
    EndOfStream,
}

/// A participant's complete session state machine.
pub struct CanvasEngine {
    config: EngineConfig,
    /// Visible canvas: confirmed history plus pending local predictions.
    doc: CanvasState,
    acl: AclState,
    users: UserList,
    layer_list: LayerList,
    timeline: Timeline,
    metadata: DocumentMetadata,
    fork: LocalFork,
    events: EventQueue,
    recorder: Option<Recorder>,
    player: Option<Player>,
    last_seq: u64,
    savepoints: VecDeque<Savepoint>,
    last_savepoint: Option<Instant>,
}

impl Default for CanvasEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl CanvasEngine {
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            doc: CanvasState::new(),
            acl: AclState::new(),
            users: UserList::new(),
            layer_list: LayerList::new(),
            timeline: Timeline::new(),
            metadata: DocumentMetadata::new(),
            fork: LocalFork::new(),
            events: EventQueue::new(),
            recorder: None,
            player: None,
            last_seq: 0,
            savepoints: VecDeque::new(),
            last_savepoint: None,
        }
    }

    // =============================================================
    // Confirmed command ingestion
    // =============================================================

    /// Apply a batch of confirmed commands in stream order.
    ///
    /// Every command is recorded (when recording) before any gating, so the
    /// recording captures the stream as received. Permission denials skip
    /// the command and emit [`Event::CommandRejected`]; a structural error
    /// halts the batch at its index.
    pub fn handle_commands(&mut self, batch: &[Command]) -> BatchOutcome {
        let pending_savepoint = self.savepoint_due().then(|| self.make_savepoint());
        let mut applied = 0;
        let mut failure = None;

        for (index, cmd) in batch.iter().enumerate() {
            self.record(cmd);

            if !self.acl.permits(cmd) {
                warn!(user = cmd.user, command = cmd.payload.name(), "command rejected");
                self.events.push(Event::CommandRejected {
                    user: cmd.user,
                    reason: cmd.payload.name(),
                });
                continue;
            }

            match self.apply_confirmed(cmd) {
                Ok(()) => {
                    applied += 1;
                    if let Some(seq) = cmd.seq {
                        self.last_seq = self.last_seq.max(seq);
                    }
                }
                Err(e) => {
                    warn!(index, error = %e, command = cmd.payload.name(), "batch halted");
                    failure = Some(BatchFailure { index, error: e });
                    break;
                }
            }
        }

        if applied > 0 && failure.is_none() {
            if let Some(savepoint) = pending_savepoint {
                self.commit_savepoint(savepoint);
            }
        }
        self.events.end_batch();
        BatchOutcome { applied, failure }
    }

    fn apply_confirmed(&mut self, cmd: &Command) -> Result<(), StructuralError> {
        let payload = &cmd.payload;

        if payload.is_acl() {
            self.acl.apply(payload);
            self.users.apply(cmd);
            return Ok(());
        }

        if payload.affects_canvas() {
            if self.fork.is_active() {
                self.reconcile(cmd)?;
            } else {
                let effects = self.doc.apply(payload)?;
                self.publish_effects(&effects);
            }
            self.layer_list.apply(cmd);
            self.timeline.apply(cmd);
            if let Payload::LayerDelete { id } = payload {
                self.acl.forget_layer(id);
            }
            return Ok(());
        }

        match payload {
            Payload::Join { name } => {
                self.users.apply(cmd);
                self.users.sync_flags(&self.acl);
                self.events.push(Event::UserJoined { id: cmd.user, name: name.clone() });
            }
            Payload::Leave => {
                let name = self
                    .users
                    .user(cmd.user)
                    .map_or_else(String::new, |u| u.name.clone());
                self.users.apply(cmd);
                self.events.push(Event::UserLeft { id: cmd.user, name });
            }
            Payload::Chat { message, recipient, pin } => {
                if *pin && self.doc.set_pinned_message(message) {
                    self.events.push(Event::PinnedMessageChanged(message.clone()));
                }
                self.events.push(Event::ChatReceived {
                    from: cmd.user,
                    recipient: *recipient,
                    message: message.clone(),
                });
            }
            Payload::SetTitle { .. } => {
                if self.metadata.apply(cmd) {
                    self.events.push(Event::TitleChanged(self.metadata.title.clone()));
                }
            }
            Payload::SetMetadata { .. } => {
                self.metadata.apply(cmd);
            }
            Payload::SetTimelineFrame { .. } | Payload::RemoveTimelineFrame { .. } => {
                self.timeline.apply(cmd);
            }
            _ => {}
        }
        Ok(())
    }

    // =============================================================
    // Local fork
    // =============================================================

    /// Apply the local user's own commands speculatively, ahead of server
    /// confirmation.
    ///
    /// Only canvas-mutating payloads are accepted; anything else (and any
    /// command not from the configured local user, or denied by the current
    /// ACL state) is rejected with an event. Accepted commands mutate the
    /// visible canvas immediately and wait in the fork.
    pub fn handle_local_commands(&mut self, batch: Vec<Command>) -> BatchOutcome {
        let mut applied = 0;
        let mut failure = None;

        for (index, cmd) in batch.into_iter().enumerate() {
            if cmd.user != self.config.local_user || !cmd.payload.affects_canvas() {
                warn!(user = cmd.user, command = cmd.payload.name(), "local command rejected");
                self.events.push(Event::CommandRejected {
                    user: cmd.user,
                    reason: cmd.payload.name(),
                });
                continue;
            }
            if !self.acl.permits(&cmd) {
                warn!(user = cmd.user, command = cmd.payload.name(), "local command denied");
                self.events.push(Event::CommandRejected {
                    user: cmd.user,
                    reason: cmd.payload.name(),
                });
                continue;
            }

            self.fork.begin(&self.doc);
            match self.doc.apply(&cmd.payload) {
                Ok(effects) => {
                    self.publish_effects(&effects);
                    self.fork.push(cmd);
                    applied += 1;
                }
                Err(e) => {
                    warn!(index, error = %e, "local batch halted");
                    failure = Some(BatchFailure { index, error: e });
                    break;
                }
            }
        }

        // A fork begun for a batch that pushed nothing holds a stale
        // checkpoint; drop it.
        if !self.fork.is_active() {
            self.fork.clear();
        }
        self.events.end_batch();
        BatchOutcome { applied, failure }
    }

    /// Fold one confirmed command into an active fork.
    ///
    /// Three cases: our own command confirmed exactly as predicted (pop and
    /// advance the checkpoint, view untouched); our own command confirmed
    /// past predictions the server never took (drop those as superseded and
    /// rebuild); a foreign command landing under our predictions (advance
    /// the checkpoint and rebuild the view on top of it).
    fn reconcile(&mut self, cmd: &Command) -> Result<(), StructuralError> {
        if cmd.user == self.config.local_user {
            if self.head_matches(cmd) {
                self.fork.pop(ForkEntryState::ConfirmedMatch);
                self.advance_checkpoint(&cmd.payload)?;
                if !self.fork.is_active() {
                    self.fork.clear();
                }
                return Ok(());
            }

            while let Some(head) = self.fork.head() {
                if head.payload == cmd.payload {
                    break;
                }
                warn!(command = head.payload.name(), "local prediction superseded");
                self.fork.pop(ForkEntryState::Superseded);
            }
            if self.head_matches(cmd) {
                self.fork.pop(ForkEntryState::ConfirmedMatch);
            }
            self.advance_checkpoint(&cmd.payload)?;
            self.rebuild_view();
            return Ok(());
        }

        let effects = self.advance_checkpoint(&cmd.payload)?;
        self.publish_effects(&effects);
        self.rebuild_view();
        Ok(())
    }

    fn head_matches(&self, cmd: &Command) -> bool {
        self.fork
            .head()
            .is_some_and(|head| head.user == cmd.user && head.payload == cmd.payload)
    }

    /// Apply a confirmed payload to the fork checkpoint. The view is not
    /// touched here.
    fn advance_checkpoint(
        &mut self,
        payload: &Payload,
    ) -> Result<Vec<CanvasEffect>, StructuralError> {
        match self.fork.checkpoint_mut() {
            Some(checkpoint) => checkpoint.apply(payload),
            None => Ok(Vec::new()),
        }
    }

    /// Reset the view to the checkpoint and replay surviving predictions on
    /// top. Predictions that no longer pass ACL or structural validation are
    /// dropped as superseded.
    fn rebuild_view(&mut self) {
        let Some(checkpoint) = self.fork.checkpoint() else {
            return;
        };
        self.doc = checkpoint.clone();

        let mut surviving = Vec::new();
        for entry in self.fork.take_entries() {
            if !self.acl.permits(&entry.command) {
                warn!(command = entry.command.payload.name(), "prediction no longer permitted");
                self.events.push(Event::CommandRejected {
                    user: entry.command.user,
                    reason: entry.command.payload.name(),
                });
                continue;
            }
            match self.doc.apply(&entry.command.payload) {
                Ok(effects) => {
                    self.publish_effects(&effects);
                    surviving.push(entry);
                }
                Err(e) => {
                    warn!(error = %e, command = entry.command.payload.name(),
                        "prediction no longer applies");
                    self.events.push(Event::CommandRejected {
                        user: entry.command.user,
                        reason: entry.command.payload.name(),
                    });
                }
            }
        }

        if surviving.is_empty() {
            self.fork.clear();
        } else {
            self.fork.restore_entries(surviving);
        }
        self.events.push(Event::CanvasModified);
    }

    // =============================================================
    // Snapshots
    // =============================================================

    /// The command stream that reproduces the current confirmed state.
    ///
    /// While a fork is active the snapshot comes from its checkpoint, so
    /// unconfirmed local predictions never leak to other participants.
    /// `include_pinned_message` controls whether the pinned chat message
    /// ships; resyncs for viewers without chat visibility pass `false`.
    #[must_use]
    pub fn snapshot(&self, include_pinned_message: bool, mask: AclMask) -> Vec<Command> {
        let doc = self.fork.checkpoint().unwrap_or(&self.doc);
        generate_snapshot(
            doc,
            &self.acl,
            &self.users,
            &self.timeline,
            &self.metadata,
            include_pinned_message,
            mask,
        )
    }

    // =============================================================
    // Savepoints
    // =============================================================

    /// Whether the retention policy allows capturing a rollback point now:
    /// savepoints enabled and the minimum spacing elapsed.
    fn savepoint_due(&self) -> bool {
        if self.config.snapshot_max_count == 0 {
            return false;
        }
        let min_delay = u128::try_from(self.config.snapshot_min_delay_ms).unwrap_or(0);
        self.last_savepoint
            .is_none_or(|at| at.elapsed().as_millis() >= min_delay)
    }

    /// The confirmed session state as a rollback point. While a fork is
    /// active the confirmed state is the checkpoint, not the view.
    fn make_savepoint(&self) -> Savepoint {
        Savepoint {
            seq: self.last_seq,
            doc: self.fork.checkpoint().unwrap_or(&self.doc).clone(),
            acl: self.acl.clone(),
            users: self.users.clone(),
            layer_list: self.layer_list.clone(),
            timeline: self.timeline.clone(),
            metadata: self.metadata.clone(),
        }
    }

    fn commit_savepoint(&mut self, savepoint: Savepoint) {
        self.savepoints.push_back(savepoint);
        while self.savepoints.len() > self.config.snapshot_max_count {
            self.savepoints.pop_front();
        }
        self.last_savepoint = Some(Instant::now());
    }

    /// Capture a rollback point regardless of spacing, still bounded by the
    /// retention count.
    fn capture_savepoint(&mut self) {
        if self.config.snapshot_max_count == 0 {
            return;
        }
        let savepoint = self.make_savepoint();
        self.commit_savepoint(savepoint);
    }

    /// Number of rollback points currently retained.
    #[must_use]
    pub fn savepoint_count(&self) -> usize {
        self.savepoints.len()
    }

    /// Rewind to the most recent savepoint, consuming it. Pending local
    /// predictions are discarded. Returns `false` when no savepoint exists.
    pub fn rollback(&mut self) -> bool {
        let Some(savepoint) = self.savepoints.pop_back() else {
            return false;
        };
        info!(seq = savepoint.seq, "rolling back to savepoint");
        self.doc = savepoint.doc;
        self.acl = savepoint.acl;
        self.users = savepoint.users;
        self.layer_list = savepoint.layer_list;
        self.timeline = savepoint.timeline;
        self.metadata = savepoint.metadata;
        self.last_seq = savepoint.seq;
        self.fork.clear();
        self.events.push(Event::CanvasModified);
        self.events.end_batch();
        true
    }

    // =============================================================
    // Session lifecycle
    // =============================================================

    /// Discard the whole session state ahead of a history reset or resync.
    ///
    /// A savepoint is captured first so [`CanvasEngine::rollback`] can cancel
    /// a reset whose replacement stream never arrives. Recording and playback
    /// are unaffected.
    pub fn reset(&mut self) {
        self.capture_savepoint();
        self.doc = CanvasState::new();
        self.acl = AclState::new();
        self.users = UserList::new();
        self.layer_list = LayerList::new();
        self.timeline = Timeline::new();
        self.metadata = DocumentMetadata::new();
        self.fork.clear();
        self.last_seq = 0;
        info!("session state reset");
        self.events.push(Event::CanvasModified);
        self.events.end_batch();
    }

    /// Reset, then start from a blank canvas of the given size instead of an
    /// empty document.
    pub fn load_blank(&mut self, size: Size, background: u32) {
        self.reset();
        self.doc = CanvasState::blank(size, background);
        self.events.push(Event::CanvasModified);
        self.events.end_batch();
    }

    // =============================================================
    // Recording
    // =============================================================

    fn record(&mut self, cmd: &Command) {
        let Some(mut recorder) = self.recorder.take() else {
            return;
        };
        match recorder.record(cmd) {
            Ok(()) => self.recorder = Some(recorder),
            Err(e) => {
                error!(error = %e, "recorder failed, recording stopped");
                self.events.push(Event::RecorderStateChanged(false));
            }
        }
    }

    /// Start recording the confirmed stream to `path`, replacing any active
    /// recording. When configured, the recording opens with a full-state
    /// dump so it replays without prior history.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError`] if the target cannot be opened or the dump
    /// cannot be written.
    pub fn start_recording(&mut self, path: &Path) -> Result<(), RecordError> {
        if let Some(previous) = self.recorder.take() {
            if let Err(e) = previous.finish() {
                warn!(error = %e, "previous recording did not flush cleanly");
            }
        }

        let mut recorder = Recorder::create(path, self.config.want_history_dump)?;
        if self.config.want_history_dump {
            for cmd in self.snapshot(true, AclMask::ALL) {
                recorder.record(&cmd)?;
            }
        }
        info!(path = %path.display(), dump = self.config.want_history_dump, "recording started");
        self.recorder = Some(recorder);
        self.events.push(Event::RecorderStateChanged(true));
        self.events.end_batch();
        Ok(())
    }

    /// Stop recording, returning the number of records written, or `None`
    /// if nothing was being recorded.
    pub fn stop_recording(&mut self) -> Option<u64> {
        let recorder = self.recorder.take()?;
        let records = recorder.records();
        if let Err(e) = recorder.finish() {
            warn!(error = %e, "recording did not flush cleanly");
        }
        self.events.push(Event::RecorderStateChanged(false));
        self.events.end_batch();
        Some(records)
    }

    #[must_use]
    pub fn is_recording(&self) -> bool {
        self.recorder.is_some()
    }

    // =============================================================
    // Playback
    // =============================================================

    /// Attach a command source for playback.
    pub fn load_player(&mut self, player: Player) {
        self.player = Some(player);
    }

    /// Open a recording file for playback.
    ///
    /// # Errors
    ///
    /// Returns [`PlayError`] if the file cannot be opened or its header is
    /// invalid.
    pub fn open_recording(&mut self, path: &Path) -> Result<(), PlayError> {
        self.player = Some(Player::from_file(path)?);
        Ok(())
    }

    #[must_use]
    pub fn is_playing(&self) -> bool {
        self.player.is_some()
    }

    /// Play up to `max` commands from the attached player through the
    /// normal confirmed-command path.
    ///
    /// # Errors
    ///
    /// Returns [`PlayError`] if the source fails; the player is released
    /// and state reflects everything played before the failure.
    pub fn playback_step(&mut self, max: usize) -> Result<PlaybackProgress, PlayError> {
        let Some(player) = self.player.as_mut() else {
            return Ok(PlaybackProgress::EndOfStream);
        };
        match player.next_batch(max) {
            Ok(batch) if batch.is_empty() => {
                info!(position = player.position(), "playback finished");
                self.player = None;
                Ok(PlaybackProgress::EndOfStream)
            }
            Ok(batch) => {
                let outcome = self.handle_commands(&batch);
                if let Some(failure) = &outcome.failure {
                    warn!(index = failure.index, error = %failure.error,
                        "played command failed structurally");
                }
                Ok(PlaybackProgress::Played(batch.len()))
            }
            Err(e) => {
                self.player = None;
                Err(e)
            }
        }
    }

    // =============================================================
    // Accessors
    // =============================================================

    fn publish_effects(&mut self, effects: &[CanvasEffect]) {
        for effect in effects {
            self.events.push(match effect {
                CanvasEffect::LayerChanged(id) => Event::LayerModified(*id),
                CanvasEffect::StructureChanged => Event::CanvasModified,
                CanvasEffect::Resized { old, offset } => {
                    Event::Resized { old: *old, offset: *offset }
                }
                CanvasEffect::SelectionChanged(rect) => Event::SelectionChanged(*rect),
                CanvasEffect::BackgroundChanged => Event::BackgroundChanged,
                CanvasEffect::AnnotationsChanged => Event::AnnotationsChanged,
            });
        }
    }

    /// Drain all published events, oldest batch first.
    pub fn take_events(&mut self) -> Vec<Event> {
        self.events.take()
    }

    /// The visible canvas: confirmed history plus pending local predictions.
    #[must_use]
    pub fn canvas(&self) -> &CanvasState {
        &self.doc
    }

    #[must_use]
    pub fn acl(&self) -> &AclState {
        &self.acl
    }

    #[must_use]
    pub fn users(&self) -> &UserList {
        &self.users
    }

    #[must_use]
    pub fn layers(&self) -> &LayerList {
        &self.layer_list
    }

    #[must_use]
    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    #[must_use]
    pub fn metadata(&self) -> &DocumentMetadata {
        &self.metadata
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.metadata.title
    }

    #[must_use]
    pub fn pinned_message(&self) -> &str {
        self.doc.pinned_message()
    }

    #[must_use]
    pub fn size(&self) -> Size {
        self.doc.size()
    }

    #[must_use]
    pub fn selection(&self) -> Option<Rect> {
        self.doc.selection()
    }

    #[must_use]
    pub fn local_user(&self) -> UserId {
        self.config.local_user
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Number of local commands still awaiting confirmation.
    #[must_use]
    pub fn pending_local(&self) -> usize {
        self.fork.depth()
    }

    /// Highest confirmed stream position seen so far.
    #[must_use]
    pub fn last_seq(&self) -> u64 {
        self.last_seq
    }
}
