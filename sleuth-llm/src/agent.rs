//! Agent with an automatic tool-calling loop.
//!
//! The loop is provider-neutral: a [`ToolModel`] turns the running history
//! into either a final answer or a batch of function calls, and the agent
//! executes those calls against its registered [`Tool`]s until the model
//! answers in plain text.
//!
//! ```rust,ignore
//! let response = Agent::builder(model)
//!     .system(research_system_prompt(today))
//!     .tool(search_tool)
//!     .max_iterations(8)
//!     .build()
//!     .run("What changed in the 2024 EU AI Act?")
//!     .await?;
//! println!("{}", response.content);
//! ```

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sleuth_common::{Result, SleuthError};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Function signature advertised to the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolDeclaration {
    pub name: String,
    pub description: String,
    /// JSON schema object describing the arguments.
    pub parameters: Value,
}

/// A call requested by the model.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionCall {
    pub name: String,
    pub args: Value,
}

/// The result of executing a [`FunctionCall`], sent back on the next turn.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionResponse {
    pub name: String,
    pub response: Value,
}

/// One entry of the conversation history.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    User(String),
    Model {
        text: Option<String>,
        calls: Vec<FunctionCall>,
    },
    ToolResults(Vec<FunctionResponse>),
}

/// What the model produced for a single turn.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelTurn {
    pub text: Option<String>,
    pub calls: Vec<FunctionCall>,
}

/// A model that supports function calling.
#[async_trait]
pub trait ToolModel: Send + Sync {
    async fn turn(
        &self,
        system_prompt: Option<&str>,
        history: &[Message],
        tools: &[ToolDeclaration],
        temperature: Option<f32>,
    ) -> Result<ModelTurn>;
}

/// A tool the agent may invoke on the model's behalf.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn declaration(&self) -> ToolDeclaration;

    async fn call(&self, args: Value) -> Result<Value>;
}

/// Builder for creating an [`Agent`].
pub struct AgentBuilder {
    model: Arc<dyn ToolModel>,
    system_prompt: Option<String>,
    tools: Vec<Arc<dyn Tool>>,
    max_iterations: usize,
    temperature: Option<f32>,
}

impl AgentBuilder {
    pub fn system(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools.push(tool);
        self
    }

    /// Maximum number of model turns. Default is 10.
    pub fn max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = max;
        self
    }

    pub fn temperature(mut self, temp: Option<f32>) -> Self {
        self.temperature = temp;
        self
    }

    pub fn build(self) -> Agent {
        Agent {
            model: self.model,
            system_prompt: self.system_prompt,
            tools: self.tools,
            max_iterations: self.max_iterations,
            temperature: self.temperature,
        }
    }
}

pub struct Agent {
    model: Arc<dyn ToolModel>,
    system_prompt: Option<String>,
    tools: Vec<Arc<dyn Tool>>,
    max_iterations: usize,
    temperature: Option<f32>,
}

/// Response from an agent run.
#[derive(Debug)]
pub struct AgentResponse {
    /// The final text response from the agent.
    pub content: String,

    /// Names of the tools invoked, in call order.
    pub tool_calls_made: Vec<String>,

    /// Number of model turns taken.
    pub iterations: usize,
}

impl Agent {
    pub fn builder(model: Arc<dyn ToolModel>) -> AgentBuilder {
        AgentBuilder {
            model,
            system_prompt: None,
            tools: Vec::new(),
            max_iterations: 10,
            temperature: None,
        }
    }

    /// Run the tool loop for a single user prompt.
    ///
    /// 1. Send the history to the model
    /// 2. If the model requests function calls, execute them
    /// 3. Append the calls and their results to the history
    /// 4. Repeat until the model responds with text only
    pub async fn run(&self, prompt: impl Into<String>) -> Result<AgentResponse> {
        let mut history = vec![Message::User(prompt.into())];
        let declarations: Vec<ToolDeclaration> =
            self.tools.iter().map(|t| t.declaration()).collect();
        let mut tool_calls_made = Vec::new();
        let mut iterations = 0;

        loop {
            iterations += 1;
            if iterations > self.max_iterations {
                warn!(
                    max_iterations = self.max_iterations,
                    "Agent reached max iterations"
                );
                return Err(SleuthError::Agent(format!(
                    "Agent reached max iterations ({})",
                    self.max_iterations
                )));
            }

            info!(
                iteration = iterations,
                message_count = history.len(),
                tool_count = self.tools.len(),
                "Agent iteration starting"
            );

            let turn = self
                .model
                .turn(
                    self.system_prompt.as_deref(),
                    &history,
                    &declarations,
                    self.temperature,
                )
                .await?;

            if turn.calls.is_empty() {
                let content = turn.text.unwrap_or_default();
                info!(
                    iterations,
                    tool_calls_total = tool_calls_made.len(),
                    response_len = content.len(),
                    "Agent finished"
                );
                return Ok(AgentResponse {
                    content,
                    tool_calls_made,
                    iterations,
                });
            }

            let mut results = Vec::with_capacity(turn.calls.len());
            for call in &turn.calls {
                info!(tool = %call.name, arguments = %call.args, "Executing tool call");
                tool_calls_made.push(call.name.clone());

                let response = self.execute_tool(call).await;
                debug!(
                    tool = %call.name,
                    result_preview = %truncate_for_log(&response.to_string(), 200),
                    "Tool execution complete"
                );
                results.push(FunctionResponse {
                    name: call.name.clone(),
                    response,
                });
            }

            history.push(Message::Model {
                text: turn.text,
                calls: turn.calls,
            });
            history.push(Message::ToolResults(results));
        }
    }

    async fn execute_tool(&self, call: &FunctionCall) -> Value {
        let Some(tool) = self.tools.iter().find(|t| t.name() == call.name) else {
            warn!(tool = %call.name, "Unknown tool requested");
            return json!({ "error": format!("Unknown tool '{}'", call.name) });
        };

        match tool.call(call.args.clone()).await {
            Ok(value) => value,
            Err(e) => {
                warn!(tool = %call.name, error = %e, "Tool execution failed");
                json!({ "error": format!("Error executing tool: {e}") })
            }
        }
    }
}

/// Truncate a string for logging, respecting char boundaries.
fn truncate_for_log(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        s.to_string()
    } else {
        let mut cut = max_len;
        while !s.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}...", &s[..cut])
    }
}

/// System prompt for the research assistant, dated `today`.
pub fn research_system_prompt(today: NaiveDate) -> String {
    format!(
        r#"You are an expert research assistant. Your task is to help users find and synthesize information from the web.

CRITICAL REQUIREMENTS:
1. Break down complex questions into 4 sub-questions.
2. Use the search tool to find information from the web by passing the original question and your 4 sub-questions as a list.
3. ALWAYS include the full URL in your citations. Every fact, quote, or piece of information MUST be cited with its source URL.
4. Format citations as: "According to [Source Title](URL), ..." or "As reported by [Source Title](URL)..."
5. Never provide information without a proper URL citation.
6. If you cannot find a URL for a piece of information, clearly state that the source is unavailable.

CITATION FORMAT EXAMPLES:
- "According to [Tesla's Report](https://tesla.com/), the Model S has a 5-star safety rating."
- "As reported by [Consumer Reports](https://consumerreports.org/cars/), electric vehicles show 40% fewer maintenance issues."

Focus on accuracy, clarity, and MANDATORY URL citation of all sources. Today's date is {}."#,
        today.format("%Y-%m-%d")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct ScriptedModel {
        turns: Mutex<VecDeque<ModelTurn>>,
        seen: Mutex<Vec<Vec<Message>>>,
    }

    impl ScriptedModel {
        fn new(turns: Vec<ModelTurn>) -> Arc<Self> {
            Arc::new(Self {
                turns: Mutex::new(turns.into()),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl ToolModel for ScriptedModel {
        async fn turn(
            &self,
            _system_prompt: Option<&str>,
            history: &[Message],
            _tools: &[ToolDeclaration],
            _temperature: Option<f32>,
        ) -> Result<ModelTurn> {
            self.seen.lock().unwrap().push(history.to_vec());
            Ok(self.turns.lock().unwrap().pop_front().unwrap_or_else(|| ModelTurn {
                text: None,
                calls: vec![FunctionCall {
                    name: "echo".into(),
                    args: json!({}),
                }],
            }))
        }
    }

    struct Echo;

    #[async_trait]
    impl Tool for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        fn declaration(&self) -> ToolDeclaration {
            ToolDeclaration {
                name: "echo".into(),
                description: "Echo the arguments".into(),
                parameters: json!({ "type": "object", "properties": {} }),
            }
        }

        async fn call(&self, args: Value) -> Result<Value> {
            Ok(json!({ "echoed": args }))
        }
    }

    struct Broken;

    #[async_trait]
    impl Tool for Broken {
        fn name(&self) -> &str {
            "broken"
        }

        fn declaration(&self) -> ToolDeclaration {
            ToolDeclaration {
                name: "broken".into(),
                description: "Always fails".into(),
                parameters: json!({ "type": "object", "properties": {} }),
            }
        }

        async fn call(&self, _args: Value) -> Result<Value> {
            Err(SleuthError::Search("upstream down".into()))
        }
    }

    fn call(name: &str, args: Value) -> ModelTurn {
        ModelTurn {
            text: None,
            calls: vec![FunctionCall {
                name: name.into(),
                args,
            }],
        }
    }

    fn answer(text: &str) -> ModelTurn {
        ModelTurn {
            text: Some(text.into()),
            calls: vec![],
        }
    }

    #[tokio::test]
    async fn text_only_turn_finishes_immediately() {
        let model = ScriptedModel::new(vec![answer("done")]);
        let agent = Agent::builder(model).build();

        let resp = agent.run("hi").await.unwrap();
        assert_eq!(resp.content, "done");
        assert_eq!(resp.iterations, 1);
        assert!(resp.tool_calls_made.is_empty());
    }

    #[tokio::test]
    async fn tool_results_are_fed_back_to_the_model() {
        let model = ScriptedModel::new(vec![call("echo", json!({ "q": "rust" })), answer("ok")]);
        let agent = Agent::builder(model.clone())
            .tool(Arc::new(Echo))
            .build();

        let resp = agent.run("search rust").await.unwrap();
        assert_eq!(resp.content, "ok");
        assert_eq!(resp.iterations, 2);
        assert_eq!(resp.tool_calls_made, vec!["echo"]);

        let seen = model.seen.lock().unwrap();
        let second = &seen[1];
        assert_eq!(second.len(), 3);
        assert_eq!(
            second[2],
            Message::ToolResults(vec![FunctionResponse {
                name: "echo".into(),
                response: json!({ "echoed": { "q": "rust" } }),
            }])
        );
    }

    #[tokio::test]
    async fn unknown_and_failing_tools_are_reported_not_fatal() {
        let model = ScriptedModel::new(vec![
            call("missing", json!({})),
            call("broken", json!({})),
            answer("recovered"),
        ]);
        let agent = Agent::builder(model.clone())
            .tool(Arc::new(Broken))
            .build();

        let resp = agent.run("go").await.unwrap();
        assert_eq!(resp.content, "recovered");

        let seen = model.seen.lock().unwrap();
        let Message::ToolResults(first) = &seen[1][2] else {
            panic!("expected tool results");
        };
        assert_eq!(first[0].response["error"], "Unknown tool 'missing'");
        let Message::ToolResults(second) = &seen[2][4] else {
            panic!("expected tool results");
        };
        assert!(second[0].response["error"]
            .as_str()
            .unwrap()
            .contains("upstream down"));
    }

    #[tokio::test]
    async fn exceeding_max_iterations_is_an_error() {
        let model = ScriptedModel::new(vec![]);
        let agent = Agent::builder(model)
            .tool(Arc::new(Echo))
            .max_iterations(3)
            .build();

        let err = agent.run("loop forever").await.unwrap_err();
        assert!(matches!(err, SleuthError::Agent(msg) if msg.contains("max iterations (3)")));
    }

    #[test]
    fn research_prompt_carries_the_date_and_citation_rules() {
        let prompt = research_system_prompt(NaiveDate::from_ymd_opt(2025, 6, 1).unwrap());
        assert!(prompt.contains("Today's date is 2025-06-01."));
        assert!(prompt.contains("[Source Title](URL)"));
        assert!(prompt.contains("4 sub-questions"));
    }

    #[test]
    fn truncate_for_log_respects_char_boundaries() {
        let s = "é".repeat(10);
        let out = truncate_for_log(&s, 5);
        assert!(out.ends_with("..."));
        assert!(out.starts_with("éé"));
    }
}
