//! The step driver.

use std::sync::Arc;

use futures_util::StreamExt;
use murmur_types::rpc::methods;
use murmur_types::{find_tool, ChatMessage, ToolKind};
use serde_json::json;
use tracing::{debug, error, info, warn};

use crate::state::{merge_post_process, AgentRun, Step, DEFAULT_PLAN};
use crate::{prompts, DeviceLink, ReasoningClient, ToolRegistry};

/// Content of the immediate result appended for async and remote dispatch.
const PROCESSING: &str = "processing";

/// Executes one utterance through the graph.
///
/// Construction-time collaborators only: the graph never builds its own
/// clients. One instance serves every connection.
pub struct AgentGraph {
    reasoner: Arc<dyn ReasoningClient>,
    local_tools: Arc<ToolRegistry>,
}

impl AgentGraph {
    pub fn new(reasoner: Arc<dyn ReasoningClient>, local_tools: Arc<ToolRegistry>) -> Self {
        Self {
            reasoner,
            local_tools,
        }
    }

    /// Runs the graph for one transcribed utterance.
    ///
    /// `link` is the device connection the run belongs to; with `None`
    /// every step degrades to its no-op default instead of aborting.
    pub async fn run(&self, utterance: &str, link: Option<Arc<dyn DeviceLink>>) -> AgentRun {
        let tools = link
            .as_ref()
            .map(|l| l.effective_tools())
            .unwrap_or_default();
        let mut run = AgentRun::new(utterance, tools);

        self.intent_step(&mut run, link.as_ref()).await;

        // Driver loop: the cursor belongs here, not to the steps. The plan
        // is fixed once intent completes; steps may consult it but never
        // extend it.
        while let Some(step) = run.plan.get(run.cursor).copied() {
            debug!(step = step.name(), cursor = run.cursor, "running step");
            match step {
                Step::Tool => self.tool_step(&mut run, link.clone()).await,
                Step::Chat => self.chat_step(&mut run, link.clone()).await,
                Step::Music => {
                    // Plan marker only: playback is pushed by the detached
                    // get_music task, not by the step.
                    debug!("music step reached");
                }
                Step::NotifyListen => {
                    if let Some(link) = &link {
                        link.send_event(methods::SERVER_END_AUDIO, json!({})).await;
                    }
                }
            }
            run.cursor += 1;
        }

        run
    }

    /// Classifies the utterance and fixes the plan.
    async fn intent_step(&self, run: &mut AgentRun, link: Option<&Arc<dyn DeviceLink>>) {
        if link.is_none() {
            // No execution context: degrade to the chat-only plan rather
            // than aborting.
            warn!("intent step without a device link, using default plan");
            run.plan = DEFAULT_PLAN.to_vec();
            return;
        }

        match self
            .reasoner
            .decide(prompts::INTENT_INSTRUCTION, &run.messages, &run.tools)
            .await
        {
            Ok(message) => {
                let plan = merge_post_process(&message.tool_calls, &run.tools);
                info!(
                    tool_calls = message.tool_calls.len(),
                    plan = ?plan.iter().map(|s| s.name()).collect::<Vec<_>>(),
                    "intent resolved"
                );
                run.messages.push(message);
                run.plan = plan;
            }
            Err(e) => {
                error!("intent classification failed: {e}");
                run.plan = DEFAULT_PLAN.to_vec();
            }
        }
        run.cursor = 0;
    }

    /// Dispatches every tool call from the intent result.
    async fn tool_step(&self, run: &mut AgentRun, link: Option<Arc<dyn DeviceLink>>) {
        let calls = run.tool_calls().to_vec();

        for call in calls {
            let Some(descriptor) = find_tool(&run.tools, &call.name) else {
                run.messages.push(ChatMessage::tool_result(
                    &call.id,
                    format!("tool '{}' not found", call.name),
                ));
                continue;
            };

            match descriptor.kind() {
                ToolKind::LocalSync => {
                    let content = match self.local_tools.get(&call.name) {
                        Some(tool) => {
                            match tool.invoke(call.arguments.clone(), link.clone()).await {
                                Ok(result) => result,
                                // Errors are data: fold them into the
                                // history for the chat step to explain.
                                Err(e) => format!("tool '{}' failed: {e}", call.name),
                            }
                        }
                        None => format!("tool '{}' not found", call.name),
                    };
                    run.messages.push(ChatMessage::tool_result(&call.id, content));
                }
                ToolKind::LocalAsync => match self.local_tools.get(&call.name) {
                    Some(tool) => {
                        run.messages
                            .push(ChatMessage::tool_result(&call.id, PROCESSING));
                        let link = link.clone();
                        let name = call.name.clone();
                        let args = call.arguments.clone();
                        // Fire and forget: the task owns its Arcs and may
                        // outlive this run.
                        tokio::spawn(async move {
                            if let Err(e) = tool.invoke(args, link).await {
                                warn!(tool = %name, "async tool failed: {e}");
                            }
                        });
                    }
                    None => {
                        run.messages.push(ChatMessage::tool_result(
                            &call.id,
                            format!("tool '{}' not found", call.name),
                        ));
                    }
                },
                ToolKind::RemoteSync | ToolKind::RemoteAsync => {
                    run.messages
                        .push(ChatMessage::tool_result(&call.id, PROCESSING));
                    if let Some(link) = &link {
                        let call_id = link
                            .dispatch_remote_tool(&call.name, &call.arguments)
                            .await;
                        debug!(tool = %call.name, %call_id, "delegated to device");
                    }
                }
            }
        }
    }

    /// Generates the spoken reply and pushes it through delivery.
    async fn chat_step(&self, run: &mut AgentRun, link: Option<Arc<dyn DeviceLink>>) {
        let Some(link) = link else {
            debug!("chat step without a device link, skipping delivery");
            return;
        };

        match self
            .reasoner
            .reply(prompts::ROLE_INSTRUCTION, &run.messages)
            .await
        {
            Ok(stream) => {
                let spoken = link.deliver_text(stream).await;
                run.messages.push(ChatMessage::assistant(spoken));
            }
            Err(e) => {
                error!("reply generation failed: {e}");
                let fallback = prompts::FALLBACK_REPLY.to_string();
                let stream = futures_util::stream::iter([fallback.clone()]).boxed();
                link.deliver_text(stream).await;
                run.messages.push(ChatMessage::assistant(fallback));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bytes::Bytes;
    use murmur_types::{Role, ToolCall, ToolDescriptor, ToolHost, ToolMode};
    use serde_json::Value;
    use std::sync::Mutex;
    use std::time::Duration;

    use crate::{AgentError, LocalTool, TextStream};

    struct MockReasoner {
        decision: ChatMessage,
        reply_chunks: Vec<String>,
    }

    #[async_trait]
    impl ReasoningClient for MockReasoner {
        async fn decide(
            &self,
            _system: &str,
            _history: &[ChatMessage],
            _tools: &[ToolDescriptor],
        ) -> Result<ChatMessage, AgentError> {
            Ok(self.decision.clone())
        }

        async fn reply(
            &self,
            _system: &str,
            _history: &[ChatMessage],
        ) -> Result<TextStream, AgentError> {
            Ok(futures_util::stream::iter(self.reply_chunks.clone()).boxed())
        }
    }

    #[derive(Default)]
    struct MockLink {
        tools: Vec<ToolDescriptor>,
        events: Mutex<Vec<String>>,
        dispatched: Mutex<Vec<(String, Value)>>,
        delivered: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl DeviceLink for MockLink {
        fn effective_tools(&self) -> Vec<ToolDescriptor> {
            self.tools.clone()
        }

        async fn send_event(&self, method: &str, _params: Value) {
            self.events.lock().unwrap().push(method.to_string());
        }

        async fn dispatch_remote_tool(&self, name: &str, args: &Value) -> String {
            self.dispatched
                .lock()
                .unwrap()
                .push((name.to_string(), args.clone()));
            "tool-call-test".to_string()
        }

        async fn deliver_text(&self, text: TextStream) -> String {
            let spoken: String = text.collect::<Vec<_>>().await.concat();
            self.delivered.lock().unwrap().push(spoken.clone());
            spoken
        }

        async fn deliver_pcm(&self, _pcm: Bytes) {}
    }

    struct AnswerTool;

    #[async_trait]
    impl LocalTool for AnswerTool {
        fn descriptor(&self) -> ToolDescriptor {
            ToolDescriptor {
                name: "answer".to_string(),
                description: "Returns the answer".to_string(),
                parameters: serde_json::json!({}),
                main_type: ToolHost::Local,
                sub_type: ToolMode::Sync,
                post_process: Some(vec![
                    "tool".to_string(),
                    "chat".to_string(),
                    "notify_listen".to_string(),
                ]),
            }
        }

        async fn invoke(
            &self,
            _args: Value,
            _link: Option<Arc<dyn DeviceLink>>,
        ) -> Result<String, AgentError> {
            Ok("42".to_string())
        }
    }

    struct SignalTool {
        tx: Mutex<Option<tokio::sync::oneshot::Sender<()>>>,
    }

    #[async_trait]
    impl LocalTool for SignalTool {
        fn descriptor(&self) -> ToolDescriptor {
            ToolDescriptor {
                name: "signal".to_string(),
                description: "Signals its invocation".to_string(),
                parameters: serde_json::json!({}),
                main_type: ToolHost::Local,
                sub_type: ToolMode::Async,
                post_process: Some(vec!["tool".to_string(), "notify_listen".to_string()]),
            }
        }

        async fn invoke(
            &self,
            _args: Value,
            _link: Option<Arc<dyn DeviceLink>>,
        ) -> Result<String, AgentError> {
            if let Some(tx) = self.tx.lock().unwrap().take() {
                let _ = tx.send(());
            }
            Ok(String::new())
        }
    }

    fn call(name: &str) -> ToolCall {
        ToolCall {
            id: format!("call-{name}"),
            name: name.to_string(),
            arguments: serde_json::json!({}),
        }
    }

    fn decision_with_calls(calls: Vec<ToolCall>) -> ChatMessage {
        ChatMessage {
            role: Role::Assistant,
            content: String::new(),
            tool_calls: calls,
            tool_call_id: None,
        }
    }

    fn graph_with(
        decision: ChatMessage,
        reply_chunks: Vec<String>,
        tools: Vec<Arc<dyn LocalTool>>,
    ) -> AgentGraph {
        let mut registry = ToolRegistry::new();
        for tool in tools {
            registry.register(tool);
        }
        AgentGraph::new(
            Arc::new(MockReasoner {
                decision,
                reply_chunks,
            }),
            Arc::new(registry),
        )
    }

    #[tokio::test]
    async fn direct_answer_uses_default_plan() {
        let graph = graph_with(
            decision_with_calls(Vec::new()),
            vec!["hi ".to_string(), "there".to_string()],
            Vec::new(),
        );
        let link = Arc::new(MockLink::default());

        let run = graph.run("hello", Some(link.clone())).await;

        assert_eq!(run.plan, vec![Step::Chat, Step::NotifyListen]);
        assert!(run.finished());
        assert_eq!(link.delivered.lock().unwrap().as_slice(), ["hi there"]);
        assert_eq!(
            link.events.lock().unwrap().as_slice(),
            [methods::SERVER_END_AUDIO]
        );
        // History: user, intent assistant, chat assistant.
        assert_eq!(run.messages.last().unwrap().content, "hi there");
    }

    #[tokio::test]
    async fn sync_tool_result_and_not_found_both_land_in_history() {
        let answer = Arc::new(AnswerTool);
        let link = Arc::new(MockLink {
            tools: vec![answer.descriptor()],
            ..Default::default()
        });
        let graph = graph_with(
            decision_with_calls(vec![call("answer"), call("ghost")]),
            vec!["done".to_string()],
            vec![answer as Arc<dyn LocalTool>],
        );

        let run = graph.run("what is the answer", Some(link.clone())).await;

        let tool_turns: Vec<&ChatMessage> = run
            .messages
            .iter()
            .filter(|m| m.role == Role::Tool)
            .collect();
        assert_eq!(tool_turns.len(), 2);
        assert_eq!(tool_turns[0].content, "42");
        assert!(tool_turns[1].content.contains("not found"));

        // The run still reaches its final step.
        assert!(run.finished());
        assert_eq!(
            link.events.lock().unwrap().as_slice(),
            [methods::SERVER_END_AUDIO]
        );
    }

    #[tokio::test]
    async fn async_tool_is_spawned_and_reports_processing() {
        let (tx, rx) = tokio::sync::oneshot::channel();
        let signal = Arc::new(SignalTool {
            tx: Mutex::new(Some(tx)),
        });
        let link = Arc::new(MockLink {
            tools: vec![signal.descriptor()],
            ..Default::default()
        });
        let graph = graph_with(
            decision_with_calls(vec![call("signal")]),
            Vec::new(),
            vec![signal as Arc<dyn LocalTool>],
        );

        let run = graph.run("do it later", Some(link)).await;

        let tool_turn = run
            .messages
            .iter()
            .find(|m| m.role == Role::Tool)
            .expect("processing turn");
        assert_eq!(tool_turn.content, "processing");

        // The detached task fires even though the run already finished.
        tokio::time::timeout(Duration::from_secs(1), rx)
            .await
            .expect("async tool should have been invoked")
            .unwrap();
    }

    #[tokio::test]
    async fn remote_tool_is_delegated() {
        let remote = ToolDescriptor {
            name: "set_led".to_string(),
            description: String::new(),
            parameters: serde_json::json!({}),
            main_type: ToolHost::Remote,
            sub_type: ToolMode::Async,
            post_process: Some(vec![
                "tool".to_string(),
                "chat".to_string(),
                "notify_listen".to_string(),
            ]),
        };
        let link = Arc::new(MockLink {
            tools: vec![remote],
            ..Default::default()
        });
        let graph = graph_with(
            decision_with_calls(vec![ToolCall {
                id: "call-led".to_string(),
                name: "set_led".to_string(),
                arguments: serde_json::json!({"color": "blue"}),
            }]),
            vec!["on it".to_string()],
            Vec::new(),
        );

        let run = graph.run("make it blue", Some(link.clone())).await;

        let dispatched = link.dispatched.lock().unwrap();
        assert_eq!(dispatched.len(), 1);
        assert_eq!(dispatched[0].0, "set_led");
        assert_eq!(dispatched[0].1["color"], "blue");

        let tool_turn = run
            .messages
            .iter()
            .find(|m| m.role == Role::Tool)
            .expect("processing turn");
        assert_eq!(tool_turn.content, "processing");
    }

    #[tokio::test]
    async fn missing_link_degrades_to_noop_run() {
        let graph = graph_with(
            decision_with_calls(Vec::new()),
            vec!["unused".to_string()],
            Vec::new(),
        );

        let run = graph.run("hello", None).await;

        // Intent degraded to the default plan without calling the model;
        // chat skipped delivery; nothing panicked.
        assert_eq!(run.plan, DEFAULT_PLAN.to_vec());
        assert!(run.finished());
        assert_eq!(run.messages.len(), 1);
    }
}
