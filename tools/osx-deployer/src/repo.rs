//! Plugin repo version publishing.

use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_sol_types::SolCall;
use osx_permission_types::{abi::IPluginRepo, PluginRepo, Version, VersionTag};
use tracing::info;

use crate::{
    config::{Bump, PublishSettings},
    errors::{DeployError, PostconditionError, PreconditionError},
    session::Action,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PublishOutcome {
    /// The latest version already points at the plugin setup.
    Unchanged(VersionTag),
    Published { tag: VersionTag, tx: B256 },
}

/// Tag the repo will assign to the next version. `None` once the counter would overflow.
pub fn next_version_tag(latest: Option<VersionTag>, bump: Bump) -> Option<VersionTag> {
    let Some(latest) = latest else {
        return Some(VersionTag::new(1, 1));
    };
    match bump {
        Bump::Release => latest
            .release
            .checked_add(1)
            .map(|release| VersionTag::new(release, 1)),
        Bump::Build => latest
            .build
            .checked_add(1)
            .map(|build| VersionTag::new(latest.release, build)),
    }
}

/// Validated `createVersion` arguments.
struct NextVersion {
    tag: VersionTag,
    build_metadata: Bytes,
    release_metadata: Bytes,
}

fn plan_next<R: PluginRepo>(
    repo: &R,
    latest: Option<&Version>,
    settings: &PublishSettings,
) -> Result<NextVersion, PreconditionError> {
    let latest_tag = latest.map(|v| v.tag);
    let tag = next_version_tag(latest_tag, settings.bump).ok_or_else(|| {
        PreconditionError::VersionOverflow {
            repo: repo.address(),
            // only reachable with a latest version
            latest: latest_tag.unwrap_or(VersionTag::new(u8::MAX, u16::MAX)),
        }
    })?;
    // a new release carries its own metadata; builds reuse the release's
    let release_metadata = if tag.build == 1 {
        if settings.release_metadata.is_empty() {
            return Err(PreconditionError::EmptyReleaseMetadata {
                repo: repo.address(),
            });
        }
        Bytes::from(settings.release_metadata.clone().into_bytes())
    } else {
        Bytes::new()
    };
    Ok(NextVersion {
        tag,
        build_metadata: Bytes::from(settings.build_metadata.clone().into_bytes()),
        release_metadata,
    })
}

/// Publish `plugin_setup` as the next version of `repo` and verify the repo now serves it.
pub async fn publish_version<R: PluginRepo>(
    repo: &R,
    plugin_setup: Address,
    settings: &PublishSettings,
) -> Result<PublishOutcome, DeployError> {
    let latest = repo.latest_version().await?;
    if let Some(v) = latest.as_ref().filter(|v| v.plugin_setup == plugin_setup) {
        info!(repo = %repo.address(), tag = %v.tag, %plugin_setup, "version already published");
        return Ok(PublishOutcome::Unchanged(v.tag));
    }

    let next = plan_next(repo, latest.as_ref(), settings)?;
    info!(repo = %repo.address(), tag = %next.tag, %plugin_setup, "publishing version");
    let tx = repo
        .create_version(
            next.tag.release,
            plugin_setup,
            &next.build_metadata,
            &next.release_metadata,
        )
        .await?;

    let actual = repo.latest_version().await?.map(|v| v.tag);
    if actual != Some(next.tag) {
        return Err(PostconditionError::LatestVersion {
            repo: repo.address(),
            expected: next.tag,
            actual,
        }
        .into());
    }
    let published = repo.get_version(next.tag).await?;
    if published.plugin_setup != plugin_setup {
        return Err(PostconditionError::VersionSetup {
            repo: repo.address(),
            tag: next.tag,
            expected: plugin_setup,
            actual: published.plugin_setup,
        }
        .into());
    }

    info!(repo = %repo.address(), tag = %next.tag, %tx, "version published");
    Ok(PublishOutcome::Published { tag: next.tag, tx })
}

/// The `createVersion` call [`publish_version`] would send, as a management DAO action.
pub async fn plan_version<R: PluginRepo>(
    repo: &R,
    plugin_setup: Address,
    settings: &PublishSettings,
) -> Result<Option<Action>, DeployError> {
    let latest = repo.latest_version().await?;
    if latest.as_ref().is_some_and(|v| v.plugin_setup == plugin_setup) {
        return Ok(None);
    }
    let next = plan_next(repo, latest.as_ref(), settings)?;
    info!(repo = %repo.address(), tag = %next.tag, "version publication queued");
    let data = IPluginRepo::createVersionCall {
        _release: next.tag.release,
        _pluginSetup: plugin_setup,
        _buildMetadata: next.build_metadata,
        _releaseMetadata: next.release_metadata,
    }
    .abi_encode();
    Ok(Some(Action {
        to: repo.address(),
        value: U256::ZERO,
        data: Bytes::from(data),
    }))
}
