/// Screener constants.
/// Defaults, file names and limits live here so config and storage agree.

// ─── Models ───────────────────────────────────────────────────────────────────

pub mod models {
    /// Vision-capable model pulled by default.
    pub const DEFAULT_MODEL: &str = "gemma3:4b";
}

// ─── API Endpoints ────────────────────────────────────────────────────────────

pub mod endpoints {
    pub const OLLAMA_BASE_URL: &str = "http://localhost:11434";
    pub const GENERATE_PATH: &str = "/api/generate";
    pub const TAGS_PATH: &str = "/api/tags";
}

// ─── Default Settings ─────────────────────────────────────────────────────────

pub mod defaults {
    pub const TIMEOUT_SECS: u64 = 180;
    pub const PING_TIMEOUT_SECS: u64 = 10;
    pub const THEME: &str = "dark";
    pub const THEMES: &[&str] = &["dark", "light", "tokyo-night"];
    pub const MIN_SELECTION_WIDTH: u32 = 10;
    pub const MIN_SELECTION_HEIGHT: u32 = 10;
    /// Action used when neither a prompt nor an action name is given.
    pub const MANUAL_ACTION: &str = "describe";
}

// ─── Storage ──────────────────────────────────────────────────────────────────

pub mod storage {
    pub const APP_DIR: &str = "screener";
    pub const CONFIG_FILE: &str = "config.toml";
    pub const SESSIONS_DIR: &str = "captured_sessions";
    pub const LOGS_DIR: &str = "logs";
    pub const LOG_FILE_PREFIX: &str = "screener.log";
    pub const CONVERSATION_FILE: &str = "conversation.json";
    pub const SCREENSHOT_FILE: &str = "screenshot.png";
    /// Bumped when the on-disk snapshot layout changes.
    pub const SNAPSHOT_VERSION: u32 = 1;
}

// ─── Prompts ──────────────────────────────────────────────────────────────────

pub mod prompts {
    pub const DESCRIBE: &str =
        "Describe what is shown in this screenshot in detail. Use Markdown for structure.";
    pub const EXTRACT_TEXT: &str =
        "Extract all readable text from this screenshot, preserving its layout as closely as possible.";
    pub const EXPLAIN_CODE: &str =
        "The screenshot contains source code or terminal output. Explain what it does and point out any errors.";
    pub const TRANSLATE: &str =
        "Translate all text visible in this screenshot into English. Keep the original structure.";
    pub const FOLLOW_UP_INSTRUCTION: &str =
        "Please provide the answer to this new question, considering the image and the entire conversation history provided.";
}
