// Copyright 2026 Boundless Foundation, Inc.
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

use std::collections::BTreeMap;

use alloy::network::Ethereum;
use alloy::primitives::Address;
use alloy::providers::Provider;
use alloy_chains::Chain;

alloy::sol! {
    #[sol(rpc)]
    interface IPairTokens {
        function token0() external view returns (address);
        function token1() external view returns (address);
    }

    #[sol(rpc)]
    interface IERC20Symbol {
        function symbol() external view returns (string);
    }
}

pub const PAIR_TAG: &str = "pair";
pub const CHAIN_TAG: &str = "chain";

/// Tags attached to every data point of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagSet {
    pub pair: String,
    pub chain: Option<String>,
}

impl TagSet {
    pub fn new(pair: impl Into<String>, chain: Option<String>) -> Self {
        Self { pair: pair.into(), chain }
    }

    /// Builds the tag set, filling in what is not configured from chain data: the pair
    /// name from the symbols of its two tokens, the chain name from the chain id.
    pub async fn resolve<P>(
        provider: &P,
        pair_address: Address,
        pair_name: Option<String>,
        chain_name: Option<String>,
    ) -> Result<Self, alloy::contract::Error>
    where
        P: Provider<Ethereum>,
    {
        let pair = match pair_name {
            Some(name) => name,
            None => {
                let name = resolve_pair_name(provider, pair_address).await?;
                tracing::info!("Resolved pair {} name from token metadata: {}", pair_address, name);
                name
            }
        };
        let chain = match chain_name {
            Some(name) => Some(name),
            None => {
                let chain_id = provider.get_chain_id().await?;
                let name = named_chain(chain_id);
                if name.is_none() {
                    tracing::warn!("Unknown chain id {}, points carry no chain tag", chain_id);
                }
                name
            }
        };
        Ok(Self { pair, chain })
    }

    pub fn to_map(&self) -> BTreeMap<String, String> {
        let mut tags = BTreeMap::from([(PAIR_TAG.to_string(), self.pair.clone())]);
        if let Some(chain) = &self.chain {
            tags.insert(CHAIN_TAG.to_string(), chain.clone());
        }
        tags
    }
}

/// Canonical name of a well-known chain, e.g. `mainnet` for chain id 1.
pub fn named_chain(chain_id: u64) -> Option<String> {
    Chain::from_id(chain_id).named().map(|chain| chain.to_string())
}

async fn token_symbol<P>(provider: &P, token: Address) -> String
where
    P: Provider<Ethereum>,
{
    // Some early tokens return bytes32 symbols; fall back to the address.
    match IERC20Symbol::new(token, provider).symbol().call().await {
        Ok(symbol) => symbol,
        Err(err) => {
            tracing::warn!("Failed to read symbol of token {}: {}", token, err);
            token.to_string()
        }
    }
}

/// Pair name in the form `SYMBOL0/SYMBOL1`.
pub async fn resolve_pair_name<P>(
    provider: &P,
    pair_address: Address,
) -> Result<String, alloy::contract::Error>
where
    P: Provider<Ethereum>,
{
    let pair = IPairTokens::new(pair_address, provider);
    let token0 = pair.token0().call().await?;
    let token1 = pair.token1().call().await?;
    Ok(format!("{}/{}", token_symbol(provider, token0).await, token_symbol(provider, token1).await))
}
