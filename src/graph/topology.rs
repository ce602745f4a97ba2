use std::fmt;

/// The two sources that can feed the output sub-graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubGraphKind {
    Preview,
    Photo,
}

impl SubGraphKind {
    pub fn other(self) -> Self {
        match self {
            SubGraphKind::Preview => SubGraphKind::Photo,
            SubGraphKind::Photo => SubGraphKind::Preview,
        }
    }

    /// Bin name inside the pipeline
    pub fn bin_name(self) -> &'static str {
        match self {
            SubGraphKind::Preview => "video-bin",
            SubGraphKind::Photo => "photo-bin",
        }
    }
}

impl fmt::Display for SubGraphKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubGraphKind::Preview => f.write_str("preview"),
            SubGraphKind::Photo => f.write_str("photo"),
        }
    }
}

/// Run state of one source sub-graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubGraphState {
    #[default]
    Stopped,
    /// Being stopped and blocked before unlinking
    Quiescing,
    Running,
}

/// Per-sub-graph bookkeeping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SubGraphStatus {
    pub state: SubGraphState,
    /// A drop probe sits on the egress pad
    pub blocked: bool,
}

/// Model of how the source sub-graphs are wired to the output
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Topology {
    pub linked: Option<SubGraphKind>,
    pub preview: SubGraphStatus,
    pub photo: SubGraphStatus,
    /// The photo encoder and file writer branch hangs off the photo tee
    pub writer_attached: bool,
}

impl Topology {
    pub fn status(&self, kind: SubGraphKind) -> &SubGraphStatus {
        match kind {
            SubGraphKind::Preview => &self.preview,
            SubGraphKind::Photo => &self.photo,
        }
    }

    pub fn status_mut(&mut self, kind: SubGraphKind) -> &mut SubGraphStatus {
        match kind {
            SubGraphKind::Preview => &mut self.preview,
            SubGraphKind::Photo => &mut self.photo,
        }
    }

    /// Exactly one source is linked, it runs unblocked, and the other is
    /// stopped behind a drop probe.
    pub fn is_consistent(&self) -> bool {
        let Some(active) = self.linked else {
            return false;
        };
        let live = self.status(active);
        let idle = self.status(active.other());

        live.state == SubGraphState::Running
            && !live.blocked
            && idle.state == SubGraphState::Stopped
            && idle.blocked
            && (!self.writer_attached || active == SubGraphKind::Photo)
    }
}
