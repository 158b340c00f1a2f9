//! Access policy resolution (spec component C).
//!
//! Grounded in `pkg/config/config.go`'s `GetAccountImageAccessRights`,
//! `GetScopeImageAccessRights`, and `mapAndCheckAnonymousAccess`. The admin
//! flag's promotion of an account's own image rules to full pull/push is a
//! spec requirement (spec.md §4.C) the original Go source has no analogue
//! for — it is implemented as specified, not ported.

pub mod token;

use secrecy::ExposeSecret;

use crate::config::Config;

/// Pull/push rights for one image, or account-wide rights for a scope-less
/// query (the union across all of an account's image rules).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Rights {
    pub pull: bool,
    pub push: bool,
}

pub struct AccessPolicy<'a> {
    config: &'a Config,
}

impl<'a> AccessPolicy<'a> {
    pub fn new(config: &'a Config) -> Self {
        AccessPolicy { config }
    }

    fn find_account(&self, username: &str) -> Option<&crate::config::Account> {
        self.config.accounts.iter().find(|a| a.usr == username)
    }

    /// Authenticates `(username, password)`, treating an empty username as
    /// `"anonymous"`. Anonymous access additionally requires both
    /// `allow_anonymous` (the caller's intent, e.g. "no Authorization header
    /// was sent") and the server's `repo.allow_anonymous_pull` flag.
    pub fn authenticate(&self, username: &str, password: &str, allow_anonymous: bool) -> bool {
        let username = if username.is_empty() {
            "anonymous"
        } else {
            username
        };

        if username == "anonymous" {
            return allow_anonymous && self.config.repo.allow_anonymous_pull;
        }

        match self.find_account(username) {
            Some(account) => account.pwd.expose_secret() == password,
            None => false,
        }
    }

    pub fn has_admin(&self, username: &str) -> bool {
        if username.is_empty() || username == "anonymous" {
            return false;
        }
        self.find_account(username)
            .map(|a| a.admin)
            .unwrap_or(false)
    }

    /// Account-wide rights: the union of pull/push across all of the
    /// account's image rules. Used for scope-less queries (`docker login`).
    pub fn account_rights(&self, username: &str) -> Rights {
        let username = if username.is_empty() {
            "anonymous"
        } else {
            username
        };
        let Some(account) = self.find_account(username) else {
            return Rights::default();
        };
        let mut rights = Rights::default();
        for rule in &account.images {
            rights.pull |= rule.pull;
            rights.push |= rule.push;
        }
        rights
    }

    /// Account-wide rights expressed as rule-name lists rather than booleans:
    /// the names of every image rule granting pull, and every rule granting
    /// push. Used to mint a scope-less (`docker login`) token — mirrors
    /// `GetAccountImageAccessRights`.
    pub fn account_image_lists(&self, username: &str) -> (Vec<String>, Vec<String>) {
        let username = if username.is_empty() {
            "anonymous"
        } else {
            username
        };
        let Some(account) = self.find_account(username) else {
            return (vec![], vec![]);
        };
        let mut pull = Vec::new();
        let mut push = Vec::new();
        for rule in &account.images {
            if rule.pull {
                pull.push(rule.name.clone());
            }
            if rule.push {
                push.push(rule.name.clone());
            }
        }
        (pull, push)
    }

    /// Rights on a specific image: the first rule whose name equals `image`
    /// or `*`, promoted to full access if the account is admin. Empty if no
    /// rule matches.
    pub fn image_rights(&self, username: &str, image: &str) -> Rights {
        let username = if username.is_empty() {
            "anonymous"
        } else {
            username
        };
        let Some(account) = self.find_account(username) else {
            return Rights::default();
        };
        if account.admin {
            return Rights {
                pull: true,
                push: true,
            };
        }
        account
            .images
            .iter()
            .find(|rule| rule.name == image || rule.name == "*")
            .map(|rule| Rights {
                pull: rule.pull,
                push: rule.push,
            })
            .unwrap_or_default()
    }

    /// Extracts `<image>` from a Docker client scope string
    /// `repository:<image>:<ops>` by splitting on `:` and taking index 1.
    pub fn image_from_scope(scope: &str) -> Option<&str> {
        scope.split(':').nth(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Account, Config, ImageRule, RepoConfig};
    use secrecy::SecretString;

    fn test_config(allow_anonymous_pull: bool) -> Config {
        Config {
            repo: RepoConfig {
                dir: "v2".into(),
                allow_anonymous_pull,
            },
            accounts: vec![
                Account {
                    usr: "admin".into(),
                    pwd: SecretString::new("admin".into()),
                    admin: true,
                    images: vec![ImageRule {
                        name: "*".into(),
                        pull: true,
                        push: true,
                    }],
                },
                Account {
                    usr: "alice".into(),
                    pwd: SecretString::new("secret".into()),
                    admin: false,
                    images: vec![ImageRule {
                        name: "alpine".into(),
                        pull: true,
                        push: false,
                    }],
                },
                Account {
                    usr: "anonymous".into(),
                    pwd: SecretString::new(String::new()),
                    admin: false,
                    images: vec![ImageRule {
                        name: "*".into(),
                        pull: true,
                        push: false,
                    }],
                },
            ],
            ..Default::default()
        }
    }

    #[test]
    fn anonymous_requires_both_flags() {
        let cfg = test_config(true);
        let policy = AccessPolicy::new(&cfg);
        assert!(policy.authenticate("", "", true));

        let cfg_disabled = test_config(false);
        let policy_disabled = AccessPolicy::new(&cfg_disabled);
        assert!(!policy_disabled.authenticate("", "", true));
    }

    #[test]
    fn wrong_password_never_falls_back_to_anonymous() {
        let cfg = test_config(true);
        let policy = AccessPolicy::new(&cfg);
        assert!(!policy.authenticate("alice", "wrong", true));
    }

    #[test]
    fn admin_gets_full_rights_on_any_image() {
        let cfg = test_config(true);
        let policy = AccessPolicy::new(&cfg);
        let rights = policy.image_rights("admin", "anything");
        assert_eq!(rights, Rights { pull: true, push: true });
    }

    #[test]
    fn non_admin_rule_match_is_first_name_or_star() {
        let cfg = test_config(true);
        let policy = AccessPolicy::new(&cfg);
        assert_eq!(
            policy.image_rights("alice", "alpine"),
            Rights { pull: true, push: false }
        );
        assert_eq!(policy.image_rights("alice", "busybox"), Rights::default());
    }

    #[test]
    fn scope_parsing_takes_second_segment() {
        assert_eq!(
            AccessPolicy::image_from_scope("repository:alpine:pull"),
            Some("alpine")
        );
    }
}
