//! The per-turn orchestrator.
//!
//! Each call to [`AgentOrchestrator::process`] walks one turn through
//! `RECEIVED → MODEL_DECIDING → (TOOL_CALL → TOOL_RESULT_INCORPORATED)? → ANSWERED`.
//! At most one round of tool calls happens per turn; the second model request
//! disables tools so the model has to phrase an answer.

use std::sync::Arc;

use atlas_config::AppConfig;
use atlas_core::error::{Error, ProviderError, Result};
use atlas_core::knowledge::InstructionBlock;
use atlas_core::memory::ConversationMemory;
use atlas_core::message::{Message, MessageToolCall};
use atlas_core::provider::{Provider, ProviderRequest, ToolChoice};
use atlas_core::tool::{ToolCall, ToolRegistry};
use atlas_providers::OpenAiCompatProvider;
use tracing::{debug, info, warn};

use crate::prompt::PromptTemplate;

/// Display name used by the front-ends.
pub const AGENT_NAME: &str = "Atlas Crypto Intelligence Agent";

/// Appended to the instruction block. Template-escaped.
pub const GUARDRAIL: &str = "CRITICAL: You are a friendly AI. Never output raw JSON or \
tool-call syntax directly to the user. Always wait for the tool output and then explain it \
in natural language. If you are about to output something like '{{\"name\": ...}}', STOP \
and rewrite it as a natural sentence.";

/// How the orchestrator talks to the model.
#[derive(Clone)]
pub enum AgentMode {
    /// Full path: history, tools, optional tool round.
    ToolCalling(Arc<ToolRegistry>),
    /// Degraded path: instructions plus the latest utterance, nothing else.
    /// Only used when the tool agent cannot be assembled.
    SingleShot,
}

impl std::fmt::Debug for AgentMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentMode::ToolCalling(tools) => {
                f.debug_tuple("ToolCalling").field(&tools.names()).finish()
            }
            AgentMode::SingleShot => f.write_str("SingleShot"),
        }
    }
}

/// What the model chose to do with a request.
#[derive(Debug, Clone)]
pub enum ModelDecision {
    /// Plain text answer.
    Answer(String),
    /// The assistant message carrying the calls, and the calls themselves.
    ToolInvocation {
        message: Message,
        calls: Vec<MessageToolCall>,
    },
}

impl ModelDecision {
    pub fn classify(message: Message) -> Self {
        if message.has_tool_calls() {
            let calls = message.tool_calls.clone();
            ModelDecision::ToolInvocation { message, calls }
        } else {
            ModelDecision::Answer(message.content)
        }
    }
}

/// Turns one user utterance into one answer.
pub struct AgentOrchestrator {
    provider: Arc<dyn Provider>,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    /// Rendered instruction block, used alone in single-shot mode.
    instructions: String,
    /// Rendered instruction block plus guardrail.
    system_prompt: String,
    mode: AgentMode,
}

impl AgentOrchestrator {
    /// Build an orchestrator. Fails if the instruction block or guardrail is
    /// not a valid template.
    pub fn new(
        provider: Arc<dyn Provider>,
        model: impl Into<String>,
        instructions: &InstructionBlock,
        mode: AgentMode,
    ) -> Result<Self> {
        let rendered = PromptTemplate::parse(instructions.as_str())?.render()?;
        let system_prompt =
            PromptTemplate::parse(&format!("{}\n\n{GUARDRAIL}", instructions.as_str()))?
                .render()?;

        Ok(Self {
            provider,
            model: model.into(),
            temperature: 0.7,
            max_tokens: None,
            instructions: rendered,
            system_prompt,
            mode,
        })
    }

    /// A [`AgentMode::SingleShot`] orchestrator. Never fails: instructions
    /// that do not render are sent as loaded.
    pub fn single_shot(
        provider: Arc<dyn Provider>,
        model: impl Into<String>,
        instructions: &InstructionBlock,
    ) -> Self {
        let text = PromptTemplate::parse(instructions.as_str())
            .and_then(|t| t.render())
            .unwrap_or_else(|e| {
                warn!(error = %e, "Instructions did not render; sending them as loaded");
                instructions.as_str().to_string()
            });

        Self {
            provider,
            model: model.into(),
            temperature: 0.7,
            max_tokens: None,
            instructions: text.clone(),
            system_prompt: text,
            mode: AgentMode::SingleShot,
        }
    }

    /// Wire everything from configuration.
    ///
    /// A missing chat-model key is an error. The conversion tool is always
    /// offered; without its key it reports that to the model instead of
    /// calling out. Only a tool agent that cannot be assembled falls back to
    /// [`AgentMode::SingleShot`].
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let provider: Arc<dyn Provider> = Arc::new(OpenAiCompatProvider::from_config(config)?);
        let instructions = InstructionBlock::load(&config.knowledge.sources());

        if !config.has_conversion_key() {
            warn!("FREECRYPTO_API_KEY not set; conversion lookups will report it");
        }
        let tools = AgentMode::ToolCalling(Arc::new(atlas_tools::default_registry(
            &config.conversion,
        )));

        let agent = match Self::new(provider.clone(), &config.model, &instructions, tools) {
            Ok(agent) => agent,
            Err(e) => {
                warn!(error = %e, "Tool agent unavailable, falling back to single-shot mode");
                Self::single_shot(provider, &config.model, &instructions)
            }
        };

        info!(
            model = %config.model,
            mode = ?agent.mode,
            fallback_instructions = instructions.is_fallback(),
            "Agent initialized"
        );

        Ok(agent
            .with_temperature(config.temperature)
            .with_max_tokens(config.max_tokens))
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn mode(&self) -> &AgentMode {
        &self.mode
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// Answer `input`, appending the exchange to `memory` on success.
    ///
    /// On error `memory` is left exactly as it was.
    pub async fn process(&self, memory: &mut ConversationMemory, input: &str) -> Result<String> {
        info!(history = memory.len(), mode = ?self.mode, "Processing turn");

        let answer = match &self.mode {
            AgentMode::ToolCalling(tools) => self.run_with_tools(tools, memory, input).await?,
            AgentMode::SingleShot => self.run_single_shot(input).await?,
        };

        memory.record_exchange(input, answer.clone());
        Ok(answer)
    }

    async fn run_with_tools(
        &self,
        tools: &ToolRegistry,
        memory: &ConversationMemory,
        input: &str,
    ) -> Result<String> {
        let mut messages = Vec::with_capacity(memory.len() + 2);
        messages.push(Message::system(&self.system_prompt));
        messages.extend(memory.to_messages());
        messages.push(Message::user(input));

        let definitions = tools.definitions();
        let response = self
            .provider
            .complete(self.request(messages.clone(), definitions.clone(), ToolChoice::Auto))
            .await?;

        let (message, calls) = match ModelDecision::classify(response.message) {
            ModelDecision::Answer(text) => {
                debug!("Model answered directly");
                return non_empty(text);
            }
            ModelDecision::ToolInvocation { message, calls } => (message, calls),
        };

        debug!(tool_count = calls.len(), "Executing tool calls");
        messages.push(message);
        for call in &calls {
            let output = invoke_tool(tools, call).await;
            messages.push(Message::tool_result(&call.id, output));
        }

        let response = self
            .provider
            .complete(self.request(messages, definitions, ToolChoice::None))
            .await?;

        if response.message.has_tool_calls() {
            warn!("Model requested more tools after the tool round; using its text only");
        }
        non_empty(response.message.content)
    }

    async fn run_single_shot(&self, input: &str) -> Result<String> {
        let messages = vec![Message::system(&self.instructions), Message::user(input)];
        let response = self
            .provider
            .complete(ProviderRequest {
                model: self.model.clone(),
                messages,
                temperature: self.temperature,
                max_tokens: self.max_tokens,
                tools: vec![],
                tool_choice: None,
            })
            .await?;
        non_empty(response.message.content)
    }

    fn request(
        &self,
        messages: Vec<Message>,
        tools: Vec<atlas_core::provider::ToolDefinition>,
        tool_choice: ToolChoice,
    ) -> ProviderRequest {
        ProviderRequest {
            model: self.model.clone(),
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            tools,
            tool_choice: Some(tool_choice),
        }
    }
}

/// Run one requested call. Every failure becomes text for the model.
async fn invoke_tool(tools: &ToolRegistry, call: &MessageToolCall) -> String {
    let arguments = if call.arguments.trim().is_empty() {
        Ok(serde_json::Value::Object(serde_json::Map::new()))
    } else {
        serde_json::from_str(&call.arguments)
    };

    let arguments = match arguments {
        Ok(arguments) => arguments,
        Err(e) => {
            warn!(tool = %call.name, error = %e, "Unparseable tool arguments");
            return format!("Error: invalid tool arguments: {e}");
        }
    };

    let call = ToolCall {
        id: call.id.clone(),
        name: call.name.clone(),
        arguments,
    };

    match tools.execute(&call).await {
        Ok(result) => {
            if !result.success {
                warn!(tool = %call.name, "Tool reported a failure");
            }
            result.output
        }
        Err(e) => {
            warn!(tool = %call.name, error = %e, "Tool execution failed");
            format!("Error: {e}")
        }
    }
}

fn non_empty(answer: String) -> Result<String> {
    if answer.trim().is_empty() {
        return Err(Error::Provider(ProviderError::InvalidResponse(
            "model returned an empty answer".into(),
        )));
    }
    Ok(answer)
}
