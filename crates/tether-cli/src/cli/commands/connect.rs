//! Interactive session command handler.

use anyhow::{Context, Result};
use tether_core::config::Config;
use tether_core::events::{EventSink, SessionEvent};
use tether_core::interrupt::InterruptedError;
use tether_core::operator::OperatorInput;
use tether_core::session::{Session, SessionOptions, SessionOutcome};
use tether_core::{logging, transport};

use crate::modes::{self, OutputFormat};

pub async fn run(config: &Config, output: OutputFormat) -> Result<()> {
    let _log_guard = logging::init(config.log_file_path().as_deref())?;

    let transport = transport::connect(&config.host, config.port, config.connect_timeout()).await?;

    let mut input = OperatorInput::stdin().context("start operator input reader")?;
    let mut renderer = modes::renderer(output);
    renderer.emit(SessionEvent::Connected {
        peer: format!("{}:{}", config.host, config.port),
        quit_keyword: config.quit_keyword.clone(),
    });

    let session = Session::new(transport, SessionOptions::from(config));
    match session.run(&mut input, &mut renderer).await {
        SessionOutcome::Fault(err) => Err(err.into()),
        SessionOutcome::Interrupted => Err(InterruptedError.into()),
        SessionOutcome::OperatorQuit | SessionOutcome::InputClosed | SessionOutcome::PeerClosed => {
            Ok(())
        }
    }
}
