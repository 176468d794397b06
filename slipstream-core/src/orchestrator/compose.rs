//! Player composition pipeline.
//!
//! Turns an input set into a fully decorated, activated player: leaves are
//! resolved (remote identifiers concurrently), the descriptor tree is
//! built, the base player is selected by session mode (or by the input
//! being a live connection), and the fixed decorator chain is applied.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;
use url::Url;

use crate::config::SlipstreamConfig;
use crate::descriptor::{
    ContentIdResolver, DescriptorError, build_tree, resolve_local, resolve_remote_set,
};
use crate::player::automated_run::LoggingCaptureSink;
use crate::player::{
    AutomatedRunPlayer, BridgeConnector, CaptureSink, LiveBridgePlayer, OrderedPlayer, Player,
    PlayerError, RandomAccessPlayer, SeekTimeResolver, TrustRegistry, UserTransformPlayer,
};
use crate::source::ReaderFactory;

/// Errors raised while composing or orchestrating players.
#[derive(Debug, thiserror::Error)]
pub enum ComposeError {
    /// Descriptor-tree construction rejected the input set.
    #[error(transparent)]
    Descriptor(#[from] DescriptorError),

    /// A player operation failed during composition or forwarding.
    #[error(transparent)]
    Player(#[from] PlayerError),

    /// The input set was superseded by a newer request before its build
    /// completed; its result was discarded.
    #[error("Input set superseded by a newer request")]
    Superseded,

    /// The orchestrator has shut down.
    #[error("Orchestrator is shut down")]
    Shutdown,
}

/// The requested input set.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum InputSet {
    /// No inputs; no player is active.
    #[default]
    None,
    /// Ordered local recorded-data files.
    LocalFiles(Vec<PathBuf>),
    /// Ordered remote recorded-data URLs.
    RemoteFiles(Vec<Url>),
    /// A single live-connection URL.
    Bridge(Url),
}

/// How a new input set relates to the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputGesture {
    /// Replace the active input set wholesale.
    #[default]
    Replace,
    /// Append a single new source as the prefixed second source, keeping
    /// the current single source first.
    AddSecond,
}

/// Builds capture sinks for automated-run players.
pub trait CaptureSinkProvider: Send + Sync {
    /// Creates the sink a newly composed automated-run player will notify.
    fn create(&self) -> Box<dyn CaptureSink>;
}

/// External collaborators the composition pipeline depends on.
pub struct ComposeDeps {
    /// Opens readers for leaf descriptors.
    pub reader_factory: Arc<dyn ReaderFactory>,
    /// Establishes live bridge connections.
    pub bridge_connector: Arc<dyn BridgeConnector>,
    /// Resolves remote content identifiers.
    pub content_resolver: Arc<dyn ContentIdResolver>,
    /// Supplies the initial playback position for file-backed players.
    pub seek_resolver: Option<Arc<dyn SeekTimeResolver>>,
    /// Builds capture sinks for automated runs; progress is logged when
    /// absent.
    pub capture_sinks: Option<Arc<dyn CaptureSinkProvider>>,
    /// Vetted transform program sources.
    pub trust_registry: TrustRegistry,
}

/// A composed player ready for activation, plus its description.
///
/// Produced atomically by [`compose_player`]; consumed once by whatever
/// publishes the active player.
pub struct PlayerDefinition {
    /// The fully decorated, activated player.
    pub player: Box<dyn Player>,
    /// Human-readable summary of the input set that produced it.
    pub description: String,
    /// Kind of the base player at the bottom of the decorator chain.
    pub source_kind: &'static str,
}

/// Composes a player for `inputs`.
///
/// Remote identifier resolution runs concurrently across the set's URLs;
/// the descriptor tree is only built after every resolution settles. The
/// base player is activated here so source failures surface as build
/// failures rather than inside an already-published player. Returns
/// `Ok(None)` for an empty input set.
///
/// # Errors
/// - `ComposeError::Descriptor` - more than two sources supplied
/// - `ComposeError::Player` - a source could not be opened or the bridge
///   could not connect
pub async fn compose_player(
    inputs: &InputSet,
    config: &SlipstreamConfig,
    deps: &ComposeDeps,
) -> Result<Option<PlayerDefinition>, ComposeError> {
    let (descriptor, located) = match inputs {
        InputSet::None => return Ok(None),
        InputSet::Bridge(url) => {
            let player = LiveBridgePlayer::connect(url, deps.bridge_connector.as_ref()).await?;
            let definition = decorate(
                Box::new(player),
                format!("Live bridge at {url}"),
                "live-bridge",
                config,
                deps,
            );
            return Ok(Some(definition));
        }
        InputSet::LocalFiles(paths) => {
            guard_input_count(paths.len())?;
            let leaves = paths.iter().cloned().map(resolve_local).collect();
            (build_tree(leaves)?, "local files")
        }
        InputSet::RemoteFiles(urls) => {
            guard_input_count(urls.len())?;
            let handles =
                resolve_remote_set(urls.clone(), deps.content_resolver.as_ref()).await;
            let leaves = handles
                .into_iter()
                .map(|handle| handle.into_descriptor())
                .collect();
            (build_tree(leaves)?, "remote files")
        }
    };

    let Some(descriptor) = descriptor else {
        return Ok(None);
    };

    let summary = descriptor.summary();
    let definition = if config.mode.is_automated() {
        let sink: Box<dyn CaptureSink> = match &deps.capture_sinks {
            Some(provider) => provider.create(),
            None => Box::new(LoggingCaptureSink::default()),
        };
        let mut player = AutomatedRunPlayer::new(
            &descriptor,
            deps.reader_factory.as_ref(),
            &config.capture,
            sink,
        )?;
        player.activate().await?;
        decorate(
            Box::new(player),
            format!("Automated capture of {summary}"),
            "automated-run",
            config,
            deps,
        )
    } else {
        let mut player = RandomAccessPlayer::new(
            &descriptor,
            deps.reader_factory.as_ref(),
            &config.playback,
            deps.seek_resolver.clone(),
        )?;
        player.activate().await?;
        decorate(
            Box::new(player),
            summary,
            "random-access",
            config,
            deps,
        )
    };

    info!(
        kind = definition.source_kind,
        sources = located,
        description = %definition.description,
        "Composed player"
    );
    Ok(Some(definition))
}

/// Applies the fixed decorator chain to a base player.
///
/// Order matters: the order-correction decorator wraps the transform
/// decorator so it resequences the transform-expanded stream.
fn decorate(
    base: Box<dyn Player>,
    description: String,
    source_kind: &'static str,
    config: &SlipstreamConfig,
    deps: &ComposeDeps,
) -> PlayerDefinition {
    let transformed = UserTransformPlayer::new(
        base,
        deps.trust_registry.clone(),
        config.transform.clone(),
    );
    let ordered = OrderedPlayer::new(Box::new(transformed), &config.playback);
    PlayerDefinition {
        player: Box::new(ordered),
        description,
        source_kind,
    }
}

fn guard_input_count(count: usize) -> Result<(), DescriptorError> {
    if count > 2 {
        return Err(DescriptorError::UnsupportedInputCount { count });
    }
    Ok(())
}

/// Combines the current and requested input sets under a gesture.
///
/// The add-second gesture only composes when both the current and the new
/// set hold exactly one source of the same kind; every other shape
/// replaces the active set wholesale.
pub(crate) fn effective_inputs(
    current: &InputSet,
    requested: InputSet,
    gesture: InputGesture,
) -> InputSet {
    if gesture != InputGesture::AddSecond {
        return requested;
    }
    match (current, requested) {
        (InputSet::LocalFiles(current_files), InputSet::LocalFiles(new_files))
            if current_files.len() == 1 && new_files.len() == 1 =>
        {
            let mut files = current_files.clone();
            files.extend(new_files);
            InputSet::LocalFiles(files)
        }
        (InputSet::RemoteFiles(current_urls), InputSet::RemoteFiles(new_urls))
            if current_urls.len() == 1 && new_urls.len() == 1 =>
        {
            let mut urls = current_urls.clone();
            urls.extend(new_urls);
            InputSet::RemoteFiles(urls)
        }
        (_, requested) => requested,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn files(names: &[&str]) -> InputSet {
        InputSet::LocalFiles(names.iter().map(PathBuf::from).collect())
    }

    #[test]
    fn test_add_second_gesture_appends_to_single_file() {
        let current = files(&["a.rec"]);
        let result = effective_inputs(&current, files(&["b.rec"]), InputGesture::AddSecond);
        assert_eq!(result, files(&["a.rec", "b.rec"]));
    }

    #[test]
    fn test_plain_input_replaces_wholesale() {
        let current = files(&["a.rec"]);
        let result = effective_inputs(&current, files(&["b.rec"]), InputGesture::Replace);
        assert_eq!(result, files(&["b.rec"]));
    }

    #[test]
    fn test_add_second_over_two_file_state_replaces() {
        let current = files(&["a.rec", "b.rec"]);
        let result = effective_inputs(&current, files(&["c.rec"]), InputGesture::AddSecond);
        assert_eq!(result, files(&["c.rec"]));
    }

    #[test]
    fn test_add_second_across_kinds_replaces() {
        let current = files(&["a.rec"]);
        let url = Url::parse("https://example.com/b.rec").expect("url");
        let result = effective_inputs(
            &current,
            InputSet::RemoteFiles(vec![url.clone()]),
            InputGesture::AddSecond,
        );
        assert_eq!(result, InputSet::RemoteFiles(vec![url]));
    }

    #[test]
    fn test_guard_rejects_three_inputs() {
        assert!(matches!(
            guard_input_count(3),
            Err(DescriptorError::UnsupportedInputCount { count: 3 })
        ));
        assert!(guard_input_count(2).is_ok());
    }
}
