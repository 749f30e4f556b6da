//! Conversational image tools - start, refine, and end editing sessions
//!
//! One generic tool serves both addressing modes; the [`SessionKeys`]
//! strategy decides where the session key comes from and whether the caller
//! ever sees it.

use chrono::Utc;
use serde::Deserialize;
use serde_json::{Value, json};

use super::keys::{ExplicitKeys, OwnerKeys, SessionKeys};
use crate::error::{Error, ToolError};
use crate::formatting::{ResponseFormatter, format_duration};
use crate::provider::{AspectRatio, ImageSize, TurnOptions};
use crate::session::{CallContext, EndOutcome, SessionManager, TurnOutcome};
use crate::storage::StorageMetadata;
use crate::tools::{BoxFuture, Tool, ToolOutput};

/// Requested operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionAction {
    #[serde(alias = "start_session", alias = "generate")]
    Start,
    Edit,
    #[serde(alias = "end_session")]
    End,
}

/// Parameters accepted by the image session tools
#[derive(Debug, Clone, Deserialize)]
pub struct ImageSessionRequest {
    pub action: SessionAction,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub aspect_ratio: Option<String>,
    #[serde(default)]
    pub image_size: Option<String>,
}

impl ImageSessionRequest {
    pub fn parse(params: Value) -> Result<Self, ToolError> {
        serde_json::from_value(params).map_err(|e| {
            ToolError::InvalidParams(format!(
                "{}. Valid actions: start, edit, end_session",
                e
            ))
        })
    }

    /// Per-turn options, falling back to `defaults` for anything unset
    pub fn turn_options(&self, defaults: TurnOptions) -> Result<TurnOptions, Error> {
        let aspect_ratio = match non_empty(&self.aspect_ratio) {
            Some(value) => value.parse::<AspectRatio>()?,
            None => defaults.aspect_ratio,
        };
        let image_size = match non_empty(&self.image_size) {
            Some(value) => value.parse::<ImageSize>()?,
            None => defaults.image_size,
        };
        Ok(TurnOptions {
            aspect_ratio,
            image_size,
        })
    }

    fn prompt(&self) -> Option<&str> {
        non_empty(&self.prompt)
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

const EDIT_IMAGE_DESCRIPTION: &str = "Create and iteratively refine images over a multi-turn editing session.\n\n\
     Actions:\n\
     - start: open a session and return its session_id. Pass a prompt to generate the first image right away.\n\
     - edit: send a change request to the session identified by session_id. The session remembers earlier turns.\n\
     - end_session: close the session identified by session_id.\n\n\
     Sessions expire after a period of inactivity; start a new one if an edit reports an expired session.";

const GENERATE_IMAGE_DESCRIPTION: &str = "Generate an image and keep refining it conversationally.\n\n\
     Actions:\n\
     - generate: create a new image from the prompt, replacing any image being edited.\n\
     - edit: change the current image. If there is none, a new one is generated from the prompt.\n\
     - end_session: stop editing the current image.";

/// Image session tool, generic over the key strategy
///
/// Build one with [`ImageSessionTool::edit_image`] for caller-held session
/// ids or [`ImageSessionTool::generate_image`] for one session per owner.
pub struct ImageSessionTool<K: SessionKeys> {
    name: &'static str,
    description: &'static str,
    manager: SessionManager,
    formatter: ResponseFormatter,
    keys: K,
}

impl ImageSessionTool<ExplicitKeys> {
    /// Explicit-key tool; pair it with `ImageSessionConfig::explicit_key()`
    pub fn edit_image(manager: SessionManager, formatter: ResponseFormatter) -> Self {
        Self::with_keys("edit_image", EDIT_IMAGE_DESCRIPTION, manager, formatter, ExplicitKeys)
    }
}

impl ImageSessionTool<OwnerKeys> {
    /// Owner-keyed tool; pair it with `ImageSessionConfig::owner_keyed()`
    pub fn generate_image(manager: SessionManager, formatter: ResponseFormatter) -> Self {
        Self::with_keys(
            "generate_image",
            GENERATE_IMAGE_DESCRIPTION,
            manager,
            formatter,
            OwnerKeys,
        )
    }
}

impl<K: SessionKeys> ImageSessionTool<K> {
    pub fn with_keys(
        name: &'static str,
        description: &'static str,
        manager: SessionManager,
        formatter: ResponseFormatter,
        keys: K,
    ) -> Self {
        Self {
            name,
            description,
            manager,
            formatter,
            keys,
        }
    }

    pub fn manager(&self) -> &SessionManager {
        &self.manager
    }

    /// Run a parsed request
    pub async fn run(
        &self,
        request: ImageSessionRequest,
        ctx: &CallContext,
    ) -> Result<ToolOutput, ToolError> {
        match request.action {
            SessionAction::Start => {
                let options = request.turn_options(self.manager.config().default_turn_options())?;
                let key = self.keys.start_key(ctx);
                // Owner-keyed sessions have no way to report a key, so they
                // always begin with an image
                let prompt = match request.prompt() {
                    Some(prompt) => Some(prompt),
                    None if self.keys.exposes_key() => None,
                    None => {
                        return Err(ToolError::InvalidParams(
                            "prompt is required for generating an image".into(),
                        ));
                    }
                };
                let outcome = self.manager.start(ctx, key, prompt, &options).await?;
                Ok(self.render_turn(&outcome, prompt.unwrap_or_default(), ctx).await)
            }
            SessionAction::Edit => {
                let key = self.keys.lookup_key(ctx, request.session_id.as_deref())?;
                let options = request.turn_options(self.manager.config().default_turn_options())?;
                let prompt = request.prompt().ok_or_else(|| {
                    ToolError::InvalidParams("prompt is required for editing".into())
                })?;
                let outcome = self.manager.edit(ctx, &key, prompt, &options).await?;
                Ok(self.render_turn(&outcome, prompt, ctx).await)
            }
            SessionAction::End => {
                let key = self.keys.lookup_key(ctx, request.session_id.as_deref())?;
                let outcome = self.manager.end(ctx, &key).await?;
                Ok(self.render_end(&outcome))
            }
        }
    }

    async fn render_turn(&self, outcome: &TurnOutcome, prompt: &str, ctx: &CallContext) -> ToolOutput {
        let explicit = self.keys.exposes_key();

        let Some(response) = &outcome.response else {
            let text = format!(
                "Image editing session started successfully.\n\n\
                 Session ID: {}\n\n\
                 Use this session ID with action='edit' to generate and modify images. \
                 The session maintains conversation context, so you can iteratively refine your images.\n\n\
                 When done, use action='end_session' to close the session.",
                outcome.key
            );
            return self.turn_output(text, outcome);
        };

        let mut text = match (explicit, outcome.first_turn) {
            (true, true) => format!(
                "Image editing session started with initial image.\n\nSession ID: {}\n\n",
                outcome.key
            ),
            (true, false) => format!("Image edited successfully.\n\nSession ID: {}\n\n", outcome.key),
            (false, true) => "Image generated successfully.\n\n".to_string(),
            (false, false) => "Image edited successfully.\n\n".to_string(),
        };

        if !response.text.is_empty() {
            let label = if explicit { "Model response" } else { "Model" };
            text.push_str(&format!("{}: {}\n\n", label, response.text));
        }

        let metadata = StorageMetadata {
            owner: outcome.owner.clone(),
            thread_id: ctx.thread_id().map(str::to_string),
            session_key: outcome.key.clone(),
            prompt: prompt.to_string(),
            created_at: Utc::now(),
        };
        let formatted = self.formatter.format_turn(response, &metadata).await;
        text.push_str(&formatted.text);

        if explicit {
            text.push_str(&format!(
                "\nUse action='edit' with session_id='{}' to continue refining, or action='end_session' to close.",
                outcome.key
            ));
        } else {
            text.push_str(
                "\nYou can continue editing this image with action='edit', or use action='end_session' when done.",
            );
        }

        self.turn_output(text, outcome)
            .with_metadata("artifacts", formatted.renderings.len())
    }

    fn turn_output(&self, text: String, outcome: &TurnOutcome) -> ToolOutput {
        let output = ToolOutput::success(text)
            .with_metadata("first_turn", outcome.first_turn)
            .with_metadata("turns", outcome.turns);
        if self.keys.exposes_key() {
            output.with_metadata("session_id", outcome.key.clone())
        } else {
            output
        }
    }

    fn render_end(&self, outcome: &EndOutcome) -> ToolOutput {
        let Some(summary) = outcome.summary() else {
            return ToolOutput::success("No active editing session to close.")
                .with_metadata("closed", false);
        };

        let duration = format_duration(summary.duration);
        let text = if self.keys.exposes_key() {
            format!(
                "Session {} closed successfully.\n\nSession duration: {}\nTotal turns: {}\n\n\
                 The session context has been cleared.",
                summary.key, duration, summary.turns
            )
        } else {
            format!(
                "Editing session closed.\n\nSession duration: {}\nTotal turns: {}",
                duration, summary.turns
            )
        };

        ToolOutput::success(text)
            .with_metadata("closed", true)
            .with_metadata("turns", summary.turns)
    }
}

impl<K: SessionKeys> Tool for ImageSessionTool<K> {
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        self.description
    }

    fn parameters_schema(&self) -> Value {
        let max_prompt_len = self.manager.config().max_prompt_len;
        let ratios: Vec<&str> = AspectRatio::ALL.iter().map(AspectRatio::as_str).collect();

        let actions = if self.keys.exposes_key() {
            ["start", "edit", "end_session"]
        } else {
            ["generate", "edit", "end_session"]
        };

        let mut properties = json!({
            "action": {
                "type": "string",
                "enum": actions,
                "description": "The operation to perform"
            },
            "prompt": {
                "type": "string",
                "description": format!(
                    "Description of the image, or of the change to make (max {} characters)",
                    max_prompt_len
                )
            },
            "aspect_ratio": {
                "type": "string",
                "enum": ratios,
                "description": "Aspect ratio of the generated image (default 1:1)"
            },
            "image_size": {
                "type": "string",
                "enum": ["1K", "2K", "4K"],
                "description": "Resolution of the generated image (default 1K)"
            }
        });

        if self.keys.exposes_key() {
            properties["session_id"] = json!({
                "type": "string",
                "description": "Session id returned by action='start'; required for edit and end_session"
            });
        }

        json!({
            "type": "object",
            "properties": properties,
            "required": ["action"]
        })
    }

    fn execute(&self, params: Value, ctx: CallContext) -> BoxFuture<'_, Result<ToolOutput, ToolError>> {
        Box::pin(async move {
            let request = ImageSessionRequest::parse(params)?;
            self.run(request, &ctx).await
        })
    }
}
