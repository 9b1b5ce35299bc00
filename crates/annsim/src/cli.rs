use clap::Parser;

/// Standard input filename
pub const STDIN_FILE: &str = "-";

const USAGE_LONG: &str = r#"
This program drives a dabswitch Coordinator from a line-oriented script, printing every state transition and tuner command it provokes. Use it to exercise announcement signalling end to end without a live ensemble.

Script commands, one per line ('#' starts a comment):

  location <code>       set the receiver location ("0025-0110-0898" or "Z1:91BB82")
  service <sid> <subch> select the original service (hex ids accepted, e.g. 0x4001)
  label <sid> <name...> attach a service label for the history log
  fig18 <hex-bytes>     feed a FIG 0/18 payload, e.g. "fig18 4001 0002 01 01"
  fig19 <hex-bytes>     feed a FIG 0/19 payload, e.g. "fig19 01 0002 12"
  lock <subch>          the tuner confirms a subchannel
  tick                  one deadline tick
  return                the user presses Return
  reset                 ensemble change: drop all announcement state
  state                 print the current state
  history               print the history log

Hex bytes may be spaced or run together. Example session:

    annsim - <<'EOF'
    service 0x4001 5
    label 0x4001 Radio One
    fig18 4001 0002 01 01
    fig19 01 0002 92
    lock 18
    fig19 01 0000 00
    lock 5
    history
    EOF
"#;

/// Top-level program arguments
#[derive(Parser, Clone, Debug)]
#[command(version)]
#[command(about, long_about = None)]
#[command(after_long_help = USAGE_LONG)]
#[command(max_term_width = 100)]
pub struct Args {
    /// Verbosity level (-vvv for more)
    #[arg(short, long, default_value_t = 0, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Script file (or "-" for stdin)
    #[arg(default_value = STDIN_FILE)]
    pub file: String,

    /// Load announcement preferences from this settings file
    #[arg(short, long)]
    pub prefs: Option<String>,

    /// Receiver location code for EWS filtering
    #[arg(short, long)]
    pub location: Option<String>,

    /// Treat FIG 0/18 service ids as 32-bit (data services)
    #[arg(long)]
    pub long_sids: bool,
}

impl Args {
    /// True if the script should be read from stdin
    pub fn input_is_stdin(&self) -> bool {
        self.file == STDIN_FILE
    }
}
