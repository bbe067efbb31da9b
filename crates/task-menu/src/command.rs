//! Callback-token grammar.
//!
//! Every inline button carries a short opaque token; the router holds
//! no per-user session state, so the token alone must say what to do.
//! Prefixes: `m_` for menu views, `t_<id>` for a task detail view,
//! `a_<verb>_<id>` for task actions, `v_<chart>` for chart requests.
//! Anything unparseable maps to [`Callback::Unknown`] instead of an
//! error, so stale or foreign tokens degrade gracefully.

/// A direct status action on a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskAction {
    Start,
    Done,
    Cancel,
}

impl TaskAction {
    pub fn verb(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Done => "done",
            Self::Cancel => "cancel",
        }
    }
}

/// Chart variants the menu can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChartKind {
    /// Task counts per status.
    Status,
    /// Open tasks per assignee.
    Workload,
    /// Task counts per priority.
    Priority,
    /// Created/completed per day.
    Trend,
}

impl ChartKind {
    pub fn slug(&self) -> &'static str {
        match self {
            Self::Status => "status",
            Self::Workload => "workload",
            Self::Priority => "priority",
            Self::Trend => "trend",
        }
    }

    fn parse(slug: &str) -> Option<Self> {
        match slug {
            "status" => Some(Self::Status),
            "workload" => Some(Self::Workload),
            "priority" => Some(Self::Priority),
            "trend" => Some(Self::Trend),
            _ => None,
        }
    }
}

/// A parsed callback token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Callback {
    /// `m_main`: the main menu.
    Main,
    /// `m_create`: how-to-create instructions.
    CreatePrompt,
    /// `m_my`: the caller's open tasks.
    My,
    /// `m_all`: all open tasks in the chat.
    All,
    /// `m_overdue`: tasks currently past their deadline.
    Overdue,
    /// `m_stats`: aggregate statistics.
    Stats,
    /// `m_viz`: chart menu.
    Charts,
    /// `t_<id>`: task detail view.
    Task(i64),
    /// `a_<verb>_<id>`: a direct status action.
    Action(TaskAction, i64),
    /// `a_edit_<id>`: edit instructions for a task.
    Edit(i64),
    /// `a_extend_<id>`: deadline-extension instructions.
    Extend(i64),
    /// `v_<chart>`: render a chart.
    Chart(ChartKind),
    /// Anything else, kept verbatim for logging.
    Unknown(String),
}

impl Callback {
    /// Parse a raw token. Never fails; malformed input becomes
    /// [`Callback::Unknown`].
    pub fn parse(token: &str) -> Self {
        match token {
            "m_main" => return Self::Main,
            "m_create" => return Self::CreatePrompt,
            "m_my" => return Self::My,
            "m_all" => return Self::All,
            "m_overdue" => return Self::Overdue,
            "m_stats" => return Self::Stats,
            "m_viz" => return Self::Charts,
            _ => {}
        }

        // Action prefixes are matched before the shorter `t_`/`v_` ones.
        let with_id = [
            ("a_start_", IdToken::Action(TaskAction::Start)),
            ("a_done_", IdToken::Action(TaskAction::Done)),
            ("a_cancel_", IdToken::Action(TaskAction::Cancel)),
            ("a_edit_", IdToken::Edit),
            ("a_extend_", IdToken::Extend),
            ("t_", IdToken::Task),
        ];
        for (prefix, kind) in with_id {
            if let Some(rest) = token.strip_prefix(prefix) {
                return match rest.parse::<i64>() {
                    Ok(id) if id > 0 => kind.build(id),
                    _ => Self::Unknown(token.to_string()),
                };
            }
        }

        if let Some(slug) = token.strip_prefix("v_") {
            if let Some(kind) = ChartKind::parse(slug) {
                return Self::Chart(kind);
            }
        }

        Self::Unknown(token.to_string())
    }

    /// Encode back to the wire token. `Unknown` round-trips verbatim.
    pub fn token(&self) -> String {
        match self {
            Self::Main => "m_main".to_string(),
            Self::CreatePrompt => "m_create".to_string(),
            Self::My => "m_my".to_string(),
            Self::All => "m_all".to_string(),
            Self::Overdue => "m_overdue".to_string(),
            Self::Stats => "m_stats".to_string(),
            Self::Charts => "m_viz".to_string(),
            Self::Task(id) => format!("t_{id}"),
            Self::Action(action, id) => format!("a_{}_{id}", action.verb()),
            Self::Edit(id) => format!("a_edit_{id}"),
            Self::Extend(id) => format!("a_extend_{id}"),
            Self::Chart(kind) => format!("v_{}", kind.slug()),
            Self::Unknown(raw) => raw.clone(),
        }
    }
}

enum IdToken {
    Action(TaskAction),
    Edit,
    Extend,
    Task,
}

impl IdToken {
    fn build(self, id: i64) -> Callback {
        match self {
            Self::Action(action) => Callback::Action(action, id),
            Self::Edit => Callback::Edit(id),
            Self::Extend => Callback::Extend(id),
            Self::Task => Callback::Task(id),
        }
    }
}
