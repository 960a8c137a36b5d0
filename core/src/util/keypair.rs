use solana_sdk::signature::Keypair;

/// Reads a JSON-bracketed byte array keypair (`[12,34,...]`) from an env var.
///
/// Matches the on-disk/env format produced by the Solana CLI's
/// `solana-keygen`.
pub fn read_keypair_from_env(env_var: &str) -> anyhow::Result<Keypair> {
  let raw = std::env::var(env_var)
    .map_err(|e| anyhow::anyhow!("failed to read {} from env: {}", env_var, e))?;
  let bytes: Vec<u8> = raw
    .trim_matches(|c| c == '[' || c == ']')
    .split(',')
    .filter_map(|s| s.trim().parse().ok())
    .collect();
  Ok(Keypair::from_bytes(&bytes)?)
}
