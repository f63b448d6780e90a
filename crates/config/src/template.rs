//! Documented config template written by `airbot init-config`.

pub const DEFAULT_CONFIG_TEMPLATE: &str = r##"# AirBot configuration
#
# Every option is shown with its default. ${ENV_VAR} and ${ENV_VAR:-default}
# placeholders are expanded from the environment (and .env) before parsing.

[bot]
prefix = "^[./!#]"                  # Regex for the command prefix
fallback_prefix = "#"               # Used when the pattern does not match
owners = []                         # e.g. ["6281234567890", "13340554342579"]
public = true                       # false = only owners may use commands
# pairing_number = "6281234567890"  # Pair by code instead of QR
pairing_delay_ms = 3000
session_dir = "session"
admin_contact = "6289523261157"
notify_owner_on_connect = true

[sidecar]
port = 9277
# dir = "sidecar/whatsapp-baileys"  # Discovered when unset
auto_start = true                   # false = connect to an already running sidecar
connect_retries = 10
request_timeout_secs = 60

[reconnect]
base_delay_ms = 1000
max_delay_ms = 60000
immediate_first = true

[ledger]
path = "database.json"
history_path = "history_saldo.json"
qris_image = "qris.jpg"
timezone = "Asia/Jakarta"
"##;
