// Copyright 2025 Lablup Inc. and Jeongkyu Shin
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Configuration loading from YAML.

use anyhow::{Context, Result};
use std::path::Path;
use tokio::fs;

use super::types::SessionConfig;
use super::utils::expand_tilde;

impl SessionConfig {
    /// Load a session configuration from a YAML file.
    pub async fn load(path: &Path) -> Result<Self> {
        let expanded_path = expand_tilde(path);

        let content = fs::read_to_string(&expanded_path)
            .await
            .with_context(|| format!("Failed to read session configuration at {}. Please check the file exists and is readable.", expanded_path.display()))?;

        Self::from_yaml_str(&content).with_context(|| {
            format!(
                "Invalid session configuration in {}",
                expanded_path.display()
            )
        })
    }

    /// Parse and validate a session configuration from YAML text.
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let config: SessionConfig = serde_yaml::from_str(content).context(
            "Failed to parse YAML session configuration.\nCommon issues:\n  - Incorrect indentation (use spaces, not tabs)\n  - Missing required keys 'host' and 'user'",
        )?;
        tracing::debug!(host = %config.host, port = config.port, "Loaded session configuration");
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AuthMode, HostKeyCheck};
    use crate::responder::Secret;
    use std::io::Write;
    use std::path::PathBuf;
    use std::time::Duration;
    use tempfile::NamedTempFile;

    #[test]
    fn test_minimal_yaml_uses_defaults() {
        let config = SessionConfig::from_yaml_str("host: build01\nuser: ci\n").unwrap();
        assert_eq!(config.host, "build01");
        assert_eq!(config.port, 22);
        assert_eq!(config.timeout, Duration::from_millis(10_000));
        assert_eq!(config.base_dir(), None);
        assert_eq!(config.host_key_check, HostKeyCheck::None);
        assert!(!config.agent_forward);
    }

    #[test]
    fn test_full_yaml() {
        let yaml = r#"
host: 10.0.0.5
port: 2222
user: deploy
password: s3cret
timeout: 2500
base_dir: /srv/app
host_key_check:
  known_hosts_file: /etc/ssh/ssh_known_hosts
"#;
        let config = SessionConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.port, 2222);
        assert_eq!(config.timeout, Duration::from_millis(2500));
        assert_eq!(config.base_dir(), Some("/srv/app"));
        assert_eq!(
            config.host_key_check,
            HostKeyCheck::KnownHostsFile(PathBuf::from("/etc/ssh/ssh_known_hosts"))
        );
        assert_eq!(config.auth_mode(), AuthMode::Password(Secret::new("s3cret")));
    }

    #[test]
    fn test_missing_user_is_rejected() {
        let err = SessionConfig::from_yaml_str("host: build01\n").unwrap_err();
        assert!(format!("{err:#}").contains("user"));
    }

    #[test]
    fn test_empty_host_is_rejected() {
        let err = SessionConfig::from_yaml_str("host: ''\nuser: ci\n").unwrap_err();
        assert!(format!("{err:#}").contains("host cannot be empty"));
    }

    #[test]
    fn test_secrets_are_not_serialized() {
        let config = SessionConfig::from_yaml_str(
            "host: h\nuser: u\npassword: topsecret\npassphrase: alsosecret\n",
        )
        .unwrap();
        let rendered = serde_yaml::to_string(&config).unwrap();
        assert!(!rendered.contains("topsecret"));
        assert!(!rendered.contains("alsosecret"));
        assert!(rendered.contains("timeout: 10000"));
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "host: example.org\nuser: admin\nagent: /run/agent.sock").unwrap();

        let config = SessionConfig::load(file.path()).await.unwrap();
        assert_eq!(config.host, "example.org");
        assert_eq!(config.auth_mode().label(), "agent");
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let err = SessionConfig::load(Path::new("/nonexistent/sshq.yaml"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Failed to read session configuration"));
    }
}
