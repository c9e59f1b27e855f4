mod bridge;
mod relay;
mod session;

pub use bridge::{
    decode_output, parse_alert, AlertSignal, OutputLine, DEFAULT_ENTRYPOINT, EXIT_CODE_PREFIX,
    NEWLINE_TOKEN, OUTPUT_BINDING,
};
pub use relay::{run, Outcome, RunnerOptions};
pub use session::BrowserSession;
