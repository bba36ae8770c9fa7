mod handler;

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use bridge_shared::ClassTag;
use extension_host::{logging, ExtensionManager, HostConfig, LibraryWatcher, RuntimeState};

/// Class user data the host attaches to the registered class.
static CLASS_TAG: u8 = 0;

fn main() -> Result<()> {
    let config_path = env::args().nth(1).map(PathBuf::from);
    let config = HostConfig::load_or_default(config_path.as_deref())?;
    logging::init_logging(&config.log_filter);

    let mut manager = ExtensionManager::start(&config)
        .with_context(|| format!("starting extension {}", config.library_path.display()))?;
    unsafe { manager.bind_handler(handler::logging_handler())? };

    exercise_class(&manager);
    play_scripted_day(&manager)?;

    if config.watch {
        let watcher = LibraryWatcher::watch(manager.source_path())?;
        loop {
            match watcher.wait_for_change(Duration::from_secs(1)) {
                Some(true) => {
                    if manager.try_hot_reload() {
                        tracing::info!(
                            staged = %manager.library().staged_path().display(),
                            gold = manager.library().session().gold(),
                            "extension reloaded"
                        );
                        exercise_class(&manager);
                    } else {
                        match &manager.runtime_state {
                            RuntimeState::ReloadFailed(msg) => {
                                tracing::warn!(%msg, "rebuild rejected; previous extension still running")
                            }
                            RuntimeState::PausedError(msg) => tracing::error!(%msg, "extension paused"),
                            RuntimeState::Running => {}
                        }
                    }
                }
                Some(false) => {}
                None => break,
            }
        }
    }

    manager.shutdown();
    Ok(())
}

/// Pushes one create/call/free cycle through the trampolines.
fn exercise_class(manager: &ExtensionManager) {
    let class_userdata = &CLASS_TAG as *const u8 as *mut ClassTag;
    let binding = manager.class_binding("MerchantGame", class_userdata);

    match unsafe { binding.instantiate() } {
        Some(instance) => {
            let result = unsafe {
                binding.call(std::ptr::null_mut(), instance.as_ptr(), &[], std::ptr::null_mut())
            };
            tracing::info!(class = binding.name(), ?result, "method call returned");
            unsafe { binding.release(instance) };
        }
        None => {
            let result = unsafe {
                binding.call(std::ptr::null_mut(), std::ptr::null_mut(), &[], std::ptr::null_mut())
            };
            tracing::info!(class = binding.name(), ?result, "no instance; method call returned");
        }
    }
}

fn play_scripted_day(manager: &ExtensionManager) -> Result<()> {
    let session = manager.library().session();

    session.start_new_game("Player")?;
    session.buy("apple", 5).context("buying apples")?;
    session.buy("herb", 10).context("buying herbs")?;
    session.advance_day();
    session.sell("apple", 2).context("selling apples")?;

    tracing::info!(
        day = session.day(),
        gold = session.gold(),
        inventory = ?session.inventory()?,
        "end of scripted day"
    );
    session.save().context("saving slot 0")?;
    Ok(())
}
