//! Default TOML config template with inline documentation comments.

/// Generate the default TOML config content with comments.
pub(crate) fn default_config_toml() -> String {
    r##"# loom configuration
# Schema version 1
# Only override what you want to change -- missing fields use defaults.

[model]
# model_name = "meta-llama/Llama-3.1-8B-Instruct"
# generation_length = 512     # 1-4096, total new tokens per reply
# chunk_size = 20             # 1-512, tokens requested per engine call
# temperature = 0.7           # 0.0-2.0
# top_p = 0.9                 # 0.0-1.0
# max_context_length = 8192   # 256-1048576

[context]
# root_role = "system"        # system, user
# system_prompt = "You are an obedient assistant following user direction."
# When a conversation outgrows the context window, the middle is dropped:
# keep_prefix = 3             # earliest turns kept (system instructions)
# keep_suffix = 8             # most recent turns kept

[storage]
# chats_dir = "/path/to/chats"   # default: platform data dir + loom/chats

[engine]
# base_url = "http://127.0.0.1:8080"
# timeout_secs = 120          # 1-3600

[logging]
# level = "INFO"              # DEBUG, INFO, WARNING, ERROR
"##
    .to_string()
}
