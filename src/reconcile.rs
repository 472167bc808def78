//! Client-side reconciliation of server state onto an editing surface.
//!
//! The reconciler turns `collaborators` snapshots into decoration
//! add/remove lists and `code` frames into wholesale buffer replacement.
//! It is deliberately a clear-then-rebuild cycle rather than a true diff:
//! on every snapshot, every previously rendered decoration is retracted
//! and the full set is rebuilt from scratch.
//!
//! Color assignment is a function of a participant's position in the
//! snapshot's iteration order, modulo the palette size — not of a stable
//! identity. A participant's color can therefore shift when others join
//! or leave. Known non-ideal; isolated in [`color_for_index`] so a
//! stable-hash mapping can replace it without protocol changes.

use indexmap::IndexMap;

use crate::advisor::{Suggestion, SuggestionKind};
use crate::protocol::{CollaboratorMap, CursorPos, ParticipantId, SelectionRange};

/// Highlight colors cycled over remote participants.
pub const PALETTE: [&str; 5] = [
    "rgba(255, 99, 132, 0.5)",
    "rgba(54, 162, 235, 0.5)",
    "rgba(255, 206, 86, 0.5)",
    "rgba(75, 192, 192, 0.5)",
    "rgba(153, 102, 255, 0.5)",
];

/// Color for the participant at `index` in the current snapshot order.
pub fn color_for_index(index: usize) -> &'static str {
    PALETTE[index % PALETTE.len()]
}

/// What a decoration marks on the surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecorationKind {
    /// A remote cursor flag, labeled with the participant's name.
    Cursor { position: CursorPos, label: String },
    /// A remote selection highlight.
    Selection { range: SelectionRange },
}

/// A visual marker derived from one remote participant's presence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoration {
    pub participant: ParticipantId,
    pub color: &'static str,
    pub kind: DecorationKind,
}

/// Decorations to retract and to apply for one reconciliation cycle.
/// `removed` must be processed before `added`.
#[derive(Debug, Default)]
pub struct ReconcileOutcome {
    pub removed: Vec<Decoration>,
    pub added: Vec<Decoration>,
}

/// Severity of an overlay marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

/// An advisory overlay marker, positioned on a 1-based editor line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlayMarker {
    pub line: u32,
    pub message: String,
    pub severity: Severity,
}

/// Applies inbound session state to local editor state.
pub struct Reconciler {
    local_id: ParticipantId,
    buffer: String,
    rendered: IndexMap<ParticipantId, Vec<Decoration>>,
}

impl Reconciler {
    /// Create a reconciler for the local participant. The local id is
    /// learned out-of-band (it is connection-scoped, not carried in the
    /// wire frames), and no decoration is ever rendered for it.
    pub fn new(local_id: ParticipantId) -> Self {
        Self {
            local_id,
            buffer: String::new(),
            rendered: IndexMap::new(),
        }
    }

    /// Process a `collaborators` snapshot: retract everything previously
    /// rendered, then rebuild decorations for every remote participant.
    ///
    /// A participant absent from the snapshot (left the session) simply
    /// never reappears in `added`, so its markers are gone after this
    /// cycle.
    pub fn apply_collaborators(&mut self, snapshot: &CollaboratorMap) -> ReconcileOutcome {
        let mut outcome = ReconcileOutcome::default();

        // Full clear: drain every decoration set from the previous cycle.
        for (_, decorations) in self.rendered.drain(..) {
            outcome.removed.extend(decorations);
        }

        // The index runs over the whole snapshot, local participant
        // included, so every client derives the same color mapping.
        for (index, (id, participant)) in snapshot.iter().enumerate() {
            if *id == self.local_id {
                continue;
            }

            let color = color_for_index(index);
            let mut decorations = Vec::new();

            if let Some(position) = participant.cursor {
                decorations.push(Decoration {
                    participant: *id,
                    color,
                    kind: DecorationKind::Cursor {
                        position,
                        label: participant.name.clone(),
                    },
                });
            }

            if let Some(range) = participant.selection {
                decorations.push(Decoration {
                    participant: *id,
                    color,
                    kind: DecorationKind::Selection { range },
                });
            }

            if !decorations.is_empty() {
                outcome.added.extend(decorations.iter().cloned());
                self.rendered.insert(*id, decorations);
            }
        }

        outcome
    }

    /// Process a `code` frame: replace the buffer wholesale. No
    /// cursor-preserving merge is attempted.
    pub fn apply_code(&mut self, code: impl Into<String>) {
        self.buffer = code.into();
    }

    /// Project advisory suggestions onto overlay markers. Suggestions use
    /// 0-based lines; markers use the editor's 1-based lines.
    pub fn apply_suggestions(&self, suggestions: &[Suggestion]) -> Vec<OverlayMarker> {
        suggestions
            .iter()
            .map(|s| OverlayMarker {
                line: s.line + 1,
                message: s.text.clone(),
                severity: match s.kind {
                    SuggestionKind::Error => Severity::Error,
                    SuggestionKind::Warning => Severity::Warning,
                    SuggestionKind::Info => Severity::Info,
                },
            })
            .collect()
    }

    /// Current local text buffer.
    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    /// Decorations currently rendered for a participant.
    pub fn decorations_for(&self, id: &ParticipantId) -> &[Decoration] {
        self.rendered.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of remote participants with rendered decorations.
    pub fn rendered_participants(&self) -> usize {
        self.rendered.len()
    }

    pub fn local_id(&self) -> ParticipantId {
        self.local_id
    }
}
