//! Per-utterance run state and plan construction.

use murmur_types::{find_tool, ChatMessage, Role, ToolCall, ToolDescriptor};
use tracing::warn;

/// The named steps the driver can route to. Closed set: device-declared
/// post-process lists may only reference these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Tool,
    Chat,
    Music,
    NotifyListen,
}

impl Step {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "tool" => Some(Self::Tool),
            "chat" => Some(Self::Chat),
            "music" => Some(Self::Music),
            "notify_listen" => Some(Self::NotifyListen),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Tool => "tool",
            Self::Chat => "chat",
            Self::Music => "music",
            Self::NotifyListen => "notify_listen",
        }
    }
}

/// Plan used when intent selects no tools, and for a selected tool whose
/// descriptor omits `post_process`.
pub const DEFAULT_PLAN: [Step; 2] = [Step::Chat, Step::NotifyListen];

/// Plan contributed by a selected tool that has no descriptor at all: the
/// dispatch step runs so its not-found result lands in the history before
/// the reply is generated.
const UNKNOWN_TOOL_PLAN: [Step; 3] = [Step::Tool, Step::Chat, Step::NotifyListen];

/// State for one utterance's trip through the graph.
#[derive(Debug)]
pub struct AgentRun {
    /// Append-only message history: user, assistant, and tool turns.
    pub messages: Vec<ChatMessage>,

    /// Tool descriptors visible to this run, resolved at creation.
    pub tools: Vec<ToolDescriptor>,

    /// Remaining steps; fixed the moment intent completes.
    pub plan: Vec<Step>,

    /// Driver-owned cursor into `plan`; only ever increases.
    pub cursor: usize,
}

impl AgentRun {
    /// The entry step: seeds the history with the transcribed utterance.
    pub fn new(utterance: &str, tools: Vec<ToolDescriptor>) -> Self {
        Self {
            messages: vec![ChatMessage::user(utterance)],
            tools,
            plan: Vec::new(),
            cursor: 0,
        }
    }

    /// Tool calls attached to the most recent assistant turn.
    pub fn tool_calls(&self) -> &[ToolCall] {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant)
            .map(|m| m.tool_calls.as_slice())
            .unwrap_or(&[])
    }

    /// True once the driver has walked past the end of the plan.
    pub fn finished(&self) -> bool {
        self.cursor >= self.plan.len()
    }
}

/// Merges the post-process plans of every selected tool.
///
/// Steps are appended in tool-selection order and de-duplicated by first
/// occurrence, so when two tools disagree on the relative order of a shared
/// step, the first-seen position wins. Unknown step names are logged and
/// skipped. No selected tools — or nothing usable — yields the default
/// chat-and-notify plan.
pub fn merge_post_process(calls: &[ToolCall], tools: &[ToolDescriptor]) -> Vec<Step> {
    let mut plan: Vec<Step> = Vec::new();

    for call in calls {
        let steps: Vec<Step> = match find_tool(tools, &call.name) {
            Some(descriptor) => match &descriptor.post_process {
                Some(names) => names
                    .iter()
                    .filter_map(|name| {
                        let step = Step::parse(name);
                        if step.is_none() {
                            warn!(tool = %call.name, step = %name, "unknown post-process step, skipping");
                        }
                        step
                    })
                    .collect(),
                None => DEFAULT_PLAN.to_vec(),
            },
            None => {
                warn!(tool = %call.name, "selected tool has no descriptor");
                UNKNOWN_TOOL_PLAN.to_vec()
            }
        };

        for step in steps {
            if !plan.contains(&step) {
                plan.push(step);
            }
        }
    }

    if plan.is_empty() {
        plan.extend(DEFAULT_PLAN);
    }
    plan
}
