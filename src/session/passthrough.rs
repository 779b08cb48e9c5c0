//! Turning the OS pointer handling of the touchpad off and back on.
//!
//! No single tool works everywhere, so a chain is tried on every toggle:
//! gsettings and KWin both get the request, then `xinput`, falling back to
//! `synclient` only when `xinput` fails. A tool that fails
//! [`FAILURE_CEILING`] times is never started again.

use std::io;
use std::process::Command;

use tracing::{debug, error};

pub const FAILURE_CEILING: u32 = 3;

pub trait PassthroughToggle: Send {
    /// `true` restores native pointer handling, `false` suppresses it.
    fn set_passthrough(&mut self, enabled: bool);
}

/// Runs one external command; `Ok(false)` means it ran and exited non-zero.
pub trait CommandRunner: Send {
    fn run(&mut self, argv: &[String]) -> io::Result<bool>;
}

pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&mut self, argv: &[String]) -> io::Result<bool> {
        let Some((program, args)) = argv.split_first() else {
            return Ok(false);
        };
        debug!("{argv:?}");
        Ok(Command::new(program).args(args).status()?.success())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mechanism {
    Gsettings,
    Qdbus,
    Xinput,
    Synclient,
}

#[derive(Debug, Default)]
struct FailureCounter(u32);

impl FailureCounter {
    fn exhausted(&self) -> bool {
        self.0 >= FAILURE_CEILING
    }
}

pub struct PassthroughChain<R = SystemRunner> {
    touchpad_name: String,
    event_node: u32,
    sudo_user: Option<String>,
    runner: R,
    failures: [FailureCounter; 4],
}

impl PassthroughChain<SystemRunner> {
    pub fn new(touchpad_name: impl Into<String>, event_node: u32) -> Self {
        let sudo_user = std::env::var("SUDO_USER").ok().filter(|u| !u.is_empty());
        Self::with_runner(touchpad_name, event_node, sudo_user, SystemRunner)
    }
}

impl<R: CommandRunner> PassthroughChain<R> {
    pub fn with_runner(
        touchpad_name: impl Into<String>,
        event_node: u32,
        sudo_user: Option<String>,
        runner: R,
    ) -> Self {
        Self {
            touchpad_name: touchpad_name.into(),
            event_node,
            sudo_user,
            runner,
            failures: Default::default(),
        }
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    pub fn command(&self, mechanism: Mechanism, enabled: bool) -> Vec<String> {
        let mut argv: Vec<String> = Vec::new();
        match mechanism {
            Mechanism::Gsettings => {
                if let Some(user) = &self.sudo_user {
                    argv.extend(["runuser".into(), "-u".into(), user.clone()]);
                }
                argv.extend([
                    "gsettings".into(),
                    "set".into(),
                    "org.gnome.desktop.peripherals.touchpad".into(),
                    "send-events".into(),
                    if enabled { "enabled" } else { "disabled" }.into(),
                ]);
            }
            Mechanism::Qdbus => argv.extend([
                "qdbus".into(),
                "org.kde.KWin".into(),
                format!("/org/kde/KWin/InputDevice/event{}", self.event_node),
                "org.kde.KWin.InputDevice.sendEvents".into(),
                u8::from(enabled).to_string(),
            ]),
            Mechanism::Xinput => argv.extend([
                "xinput".into(),
                if enabled { "enable" } else { "disable" }.into(),
                self.touchpad_name.clone(),
            ]),
            Mechanism::Synclient => argv.extend([
                "synclient".into(),
                format!("TouchpadOff={}", u8::from(!enabled)),
            ]),
        }
        argv
    }

    /// Returns whether the mechanism was tried and succeeded.
    fn attempt(&mut self, mechanism: Mechanism, enabled: bool) -> bool {
        let counter = mechanism as usize;
        if self.failures[counter].exhausted() {
            debug!("{mechanism:?} failed {FAILURE_CEILING} times, not trying anymore");
            return false;
        }
        let argv = self.command(mechanism, enabled);
        let ok = match self.runner.run(&argv) {
            Ok(ok) => ok,
            Err(e) => {
                debug!("{mechanism:?} could not run: {e}");
                false
            }
        };
        if !ok {
            self.failures[counter].0 += 1;
        }
        ok
    }

    pub fn failures(&self, mechanism: Mechanism) -> u32 {
        self.failures[mechanism as usize].0
    }
}

impl<R: CommandRunner> PassthroughToggle for PassthroughChain<R> {
    fn set_passthrough(&mut self, enabled: bool) {
        debug!("Touchpad passthrough -> {enabled}");
        self.attempt(Mechanism::Gsettings, enabled);
        self.attempt(Mechanism::Qdbus, enabled);
        if self.attempt(Mechanism::Xinput, enabled) {
            return;
        }
        if !self.attempt(Mechanism::Synclient, enabled) {
            error!("Setting libinput send events via xinput and synclient failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Fails every program named in `failing`.
    #[derive(Default)]
    struct ScriptedRunner {
        failing: Vec<&'static str>,
        calls: Vec<Vec<String>>,
    }

    impl CommandRunner for ScriptedRunner {
        fn run(&mut self, argv: &[String]) -> io::Result<bool> {
            self.calls.push(argv.to_vec());
            let program = argv
                .iter()
                .find(|arg| !["runuser", "-u", "alice"].contains(&arg.as_str()))
                .cloned()
                .unwrap_or_default();
            if self.failing.contains(&program.as_str()) {
                return Err(io::Error::from(io::ErrorKind::NotFound));
            }
            Ok(true)
        }
    }

    fn programs(calls: &[Vec<String>]) -> Vec<&str> {
        calls.iter().map(|argv| argv[0].as_str()).collect()
    }

    #[test]
    fn builds_tool_commands() {
        let chain = PassthroughChain::with_runner(
            "ASUE1416:00 04F3:31B9 Touchpad",
            11,
            Some("alice".into()),
            ScriptedRunner::default(),
        );
        assert_eq!(
            chain.command(Mechanism::Gsettings, false),
            [
                "runuser",
                "-u",
                "alice",
                "gsettings",
                "set",
                "org.gnome.desktop.peripherals.touchpad",
                "send-events",
                "disabled"
            ]
        );
        assert_eq!(
            chain.command(Mechanism::Qdbus, true)[2],
            "/org/kde/KWin/InputDevice/event11"
        );
        assert_eq!(
            chain.command(Mechanism::Xinput, false),
            ["xinput", "disable", "ASUE1416:00 04F3:31B9 Touchpad"]
        );
        assert_eq!(chain.command(Mechanism::Synclient, false), ["synclient", "TouchpadOff=1"]);
    }

    #[test]
    fn synclient_only_runs_when_xinput_fails() {
        let mut chain = PassthroughChain::with_runner("pad", 3, None, ScriptedRunner::default());
        chain.set_passthrough(false);
        assert_eq!(programs(&chain.runner().calls), ["gsettings", "qdbus", "xinput"]);

        let runner = ScriptedRunner {
            failing: vec!["xinput"],
            ..Default::default()
        };
        let mut chain = PassthroughChain::with_runner("pad", 3, None, runner);
        chain.set_passthrough(false);
        assert_eq!(
            programs(&chain.runner().calls),
            ["gsettings", "qdbus", "xinput", "synclient"]
        );
    }

    #[test]
    fn failing_tool_is_dropped_after_ceiling() {
        let runner = ScriptedRunner {
            failing: vec!["qdbus"],
            ..Default::default()
        };
        let mut chain = PassthroughChain::with_runner("pad", 3, None, runner);
        for _ in 0..5 {
            chain.set_passthrough(false);
        }
        assert_eq!(chain.failures(Mechanism::Qdbus), FAILURE_CEILING);
        let qdbus_calls = chain
            .runner()
            .calls
            .iter()
            .filter(|argv| argv[0] == "qdbus")
            .count();
        assert_eq!(qdbus_calls, FAILURE_CEILING as usize);
        assert_eq!(chain.failures(Mechanism::Gsettings), 0);
    }
}
