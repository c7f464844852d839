//! Prompt templates for Warechat.
//!
//! Prompts can be customized by placing TOML files in the custom prompts directory.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Collection of all prompt templates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct Prompts {
    pub chat: ChatPrompts,
    /// Custom variables from config, available in all prompts.
    #[serde(skip)]
    pub variables: std::collections::HashMap<String, String>,
}

/// Prompts for chunk-grounded chat.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatPrompts {
    /// System prompt; `{{video_context}}` and `{{video_metadata}}` are filled per request.
    pub system: String,
    /// Heading placed above the current question in the final user message.
    pub question_marker: String,
}

impl Default for ChatPrompts {
    fn default() -> Self {
        Self {
            system: r#"The following is a friendly conversation between a Human (H) and an AI Assistant (AI) about a Video. There is no video provided to you but only a transcript of the video. Always remember the following points when having a conversation,

- The Video information is provided to you in the `Video Context` section below. You are to only answer based on the <video_context>...</video_context> and if the answer is not available respond with "I don't know, I'm sorry the requested information is not a part of the video".

- The video transcript is a non-overlapping second by second summary provided by a video transcriber. You are to answer a user's question based on the entire transcript and keep the user's conversation history in context when answering the question.

- Remember when a human asks about a video, always assume they are talking about the <video_context>...</video_context> transcript and respond appropriately.

- The user does not know that you have the video context. Never mention the <video_context>...</video_context> to the user; answer as if you are watching the video.

<video_metadata>
{{video_metadata}}
</video_metadata>

<video_context>
{{video_context}}
</video_context>
"#
            .to_string(),

            question_marker: "### Current question".to_string(),
        }
    }
}

impl Prompts {
    /// Load prompts from the default location, with optional custom directory and variables.
    pub fn load(
        custom_dir: Option<&str>,
        custom_variables: Option<&std::collections::HashMap<String, String>>,
    ) -> crate::error::Result<Self> {
        let mut prompts = Prompts::default();

        if let Some(vars) = custom_variables {
            prompts.variables = vars.clone();
        }

        if let Some(dir) = custom_dir {
            let custom_path = PathBuf::from(shellexpand::tilde(dir).to_string());

            let chat_path = custom_path.join("chat.toml");
            if chat_path.exists() {
                let content = std::fs::read_to_string(&chat_path)?;
                prompts.chat = toml::from_str(&content)?;
            }
        }

        Ok(prompts)
    }

    /// Render a prompt template with the given variables.
    pub fn render(template: &str, vars: &std::collections::HashMap<String, String>) -> String {
        let mut result = template.to_string();
        for (key, value) in vars {
            result = result.replace(&format!("{{{{{}}}}}", key), value);
        }
        result
    }

    /// Render a prompt template with both provided variables and custom config variables.
    /// Provided variables take precedence over custom config variables.
    pub fn render_with_custom(
        &self,
        template: &str,
        vars: &std::collections::HashMap<String, String>,
    ) -> String {
        let mut merged = self.variables.clone();
        for (key, value) in vars {
            merged.insert(key.clone(), value.clone());
        }
        Self::render(template, &merged)
    }
}
