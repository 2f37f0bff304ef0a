//! # gate-actions
//!
//! Built-in actions and [`assemble_actions`], the single place that decides
//! which actions a process serves.

#![deny(unsafe_code)]

pub mod echo;
pub mod status;
pub mod user;

use gate_core::Action;
use gate_settings::GateSettings;

pub use echo::EchoAction;
pub use status::StatusAction;
pub use user::CreateUserAction;

/// Build the full action list for a process.
pub fn assemble_actions(settings: &GateSettings) -> Vec<Action> {
    vec![
        status::action(&settings.process.name),
        echo::action(),
        user::action(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use gate_core::{ActionRegistry, HttpMethod};

    #[test]
    fn assembled_actions_register_cleanly() {
        let registry = ActionRegistry::from_actions(assemble_actions(&GateSettings::default())).unwrap();
        assert_eq!(registry.names(), vec!["echo", "status", "user:create"]);
    }

    #[test]
    fn web_bindings() {
        let actions = assemble_actions(&GateSettings::default());
        let bindings: Vec<(String, HttpMethod, String)> = actions
            .iter()
            .filter_map(|a| {
                a.web_binding()
                    .map(|w| (a.name().to_owned(), w.method, w.route.clone()))
            })
            .collect();
        assert_eq!(
            bindings,
            vec![
                ("status".to_owned(), HttpMethod::Get, "/status".to_owned()),
                ("echo".to_owned(), HttpMethod::Get, "/echo/:message".to_owned()),
                ("user:create".to_owned(), HttpMethod::Post, "/users".to_owned()),
            ]
        );
    }
}
