// IMPORTANT:
// Keep ALL numeric values centralized here (repo rule: no hardcoded numeric values scattered around).

// NOTE: HOST_VERSION must stay in sync with the `version` field in Cargo.toml.
pub const HOST_VERSION: &str = "0.3.0";

pub mod logging {
    pub const LOG_DIR_REL: &str = ".notetaker/logs";
    pub const LOG_FILE_NAME: &str = "note_helper.log";

    pub const LOG_ROTATE_SIZE_BYTES: u64 = 10 * 1024 * 1024;
    pub const LOG_ROTATE_KEEP_FILES: usize = 5;
}

pub mod native_messaging {
    // Notes are plain text; anything near this size is a client bug.
    pub const MAX_MESSAGE_SIZE_BYTES: u32 = 16 * 1024 * 1024;
}

pub mod embedding {
    pub const EMBEDDING_DIMS: usize = 384;
    pub const EMBEDDING_MODEL_NAME: &str = "all-MiniLM-L6-v2";

    // Max word-piece tokens for all-MiniLM-L6-v2 (model context limit is 256).
    pub const MAX_TOKENS: usize = 256;

    // Model files are fetched lazily on first load.
    pub const MODEL_BASE_URL: &str =
        "https://huggingface.co/sentence-transformers/all-MiniLM-L6-v2/resolve/main";

    // SHA256 hashes for integrity verification
    pub const MODEL_SAFETENSORS_SHA256: &str =
        "53aa51172d142c89d9012cce15ae4d6cc0ca6895895114379cacb4fab128d9db";
    pub const TOKENIZER_JSON_SHA256: &str =
        "be50c3628f2bf5bb5e3a7f17b1f74611b2561a3a27eeab05e5aa30f411572037";
    pub const CONFIG_JSON_SHA256: &str =
        "953f9c0d463486b10a6871cc2fd59f223b2c70184f49815e7efbcab5d8908b41";

    // Local model storage directory (relative to home)
    pub const MODEL_DIR_REL: &str = ".notetaker/models/all-MiniLM-L6-v2";

    // Overrides MODEL_DIR_REL when set (also settable with --model-dir).
    pub const MODEL_DIR_ENV: &str = "NOTE_HELPER_MODEL_DIR";
}

pub mod download {
    pub const DOWNLOAD_TIMEOUT_SECS: u64 = 90;
}

pub mod cache {
    pub const EMBEDDING_CACHE_CAPACITY: usize = 50;
}

pub mod processing {
    pub const SUMMARY_SENTENCES: usize = 3;
    pub const BULLET_POINTS: usize = 5;

    // Quiet period before a debounced processText call actually runs.
    pub const DEBOUNCE_QUIET_MS: u64 = 500;

    pub const GENERIC_ERROR_MESSAGE: &str = "An unexpected error occurred";
}
