//! Default TOML config template with inline documentation comments.

/// Generate the default TOML config content with comments.
pub(crate) fn default_config_toml() -> &'static str {
    r##"# Playhub client configuration
# Schema version 1
# Only override what you want to change -- missing fields use defaults.

[signaling]
url = "ws://localhost:4000/socket"
# access_token = "..."            # sent as `Authorization: Bearer <token>`
# call_timeout_ms = 10000         # 1000-60000, per request acknowledgement
# connect_timeout_secs = 15       # 1-120
# heartbeat_interval_secs = 25    # 5-300
# reconnect_delay_secs = 1
# max_reconnect_delay_secs = 30

[voice]
# speaking_threshold = 0.02       # 0.0-1.0, normalized RMS
# frame_interval_ms = 16          # 5-250
# analyser_bins = 128             # 16-2048
# echo_cancellation = true
# noise_suppression = true
# auto_gain_control = true
# playback_volume = 1.0           # 0.0-1.0

[chat]
# max_messages_per_room = 500     # 10-10000

[identity]
# user_id = "u-123"
# display_name = "Player One"     # 1-32 characters

[logging]
# level = "info"                  # trace, debug, info, warn, error
"##
}
