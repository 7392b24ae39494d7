// Copyright 2020 The Exonum Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Logic-runner configuration (§6).
//!
//! Environment exposure and a CLI surface on top of this are peripheral to the
//! core (spec §6) and are intentionally not built here; this is plain `serde`
//! data meant to be embedded in a larger node configuration and loaded with
//! `toml::from_str`.

use std::net::SocketAddr;

use serde_derive::{Deserialize, Serialize};

/// Top-level logic-runner configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct LogicRunnerConfig {
    /// Enables the built-in (in-process) executor, if configured.
    #[serde(default)]
    pub built_in: Option<BuiltInConfig>,
    /// Enables the plugin (out-of-process) executor, if configured.
    #[serde(default)]
    pub plugin: Option<PluginConfig>,
    /// Optional listen address for a secondary RPC control socket.
    #[serde(default)]
    pub rpc_listen: Option<SocketAddr>,
}

/// Configuration for the built-in executor. Presently a marker: the built-in
/// executor needs no parameters of its own, only the fact that it is enabled.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct BuiltInConfig {}

/// Configuration for the out-of-process plugin executor.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PluginConfig {
    /// Address the plugin executor listens on for RPC calls from this node.
    pub listen: SocketAddr,
}
