#![forbid(unsafe_code)]

use charon_kernel_contracts::account::{
    RedemptionCode, REDEMPTION_CODE_ALPHABET, REDEMPTION_CODE_LEN,
};
use charon_kernel_contracts::ContractViolation;
use rand::rngs::OsRng;
use rand::RngCore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodeMintConfig {
    /// Store-insert collision retries before the approval gives up.
    /// Hitting this bound means the code space is exhausted or the RNG
    /// is broken, and the call fails as a conflict.
    pub max_collision_retries: u8,
}

impl CodeMintConfig {
    pub fn mvp_v1() -> Self {
        Self {
            max_collision_retries: 16,
        }
    }
}

/// Mints one candidate redemption code from the caller's RNG. Uniqueness
/// is the store's job: the insert enforces it and the caller re-mints on
/// collision.
pub fn mint_code(rng: &mut impl RngCore) -> Result<RedemptionCode, ContractViolation> {
    let mut raw = [0u8; REDEMPTION_CODE_LEN];
    rng.fill_bytes(&mut raw);
    let code: String = raw
        .iter()
        // The alphabet has 32 symbols, so masking the low five bits
        // samples it uniformly.
        .map(|b| REDEMPTION_CODE_ALPHABET[usize::from(b & 0x1f)] as char)
        .collect();
    RedemptionCode::new(code)
}

/// Mints from the platform CSPRNG. Codes gate a billable resource and
/// must not be guessable.
pub fn mint_code_os() -> Result<RedemptionCode, ContractViolation> {
    mint_code(&mut OsRng)
}

#[cfg(test)]
mod tests {
    use super::*;
    use charon_kernel_contracts::Validate;
    use std::collections::BTreeSet;

    struct FixedRng(Vec<u8>);

    impl RngCore for FixedRng {
        fn next_u32(&mut self) -> u32 {
            let mut buf = [0u8; 4];
            self.fill_bytes(&mut buf);
            u32::from_le_bytes(buf)
        }

        fn next_u64(&mut self) -> u64 {
            let mut buf = [0u8; 8];
            self.fill_bytes(&mut buf);
            u64::from_le_bytes(buf)
        }

        fn fill_bytes(&mut self, dest: &mut [u8]) {
            for b in dest.iter_mut() {
                *b = self.0.pop().unwrap_or(0);
            }
        }

        fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
            self.fill_bytes(dest);
            Ok(())
        }
    }

    #[test]
    fn minted_codes_satisfy_the_code_contract() {
        for _ in 0..64 {
            let code = mint_code_os().unwrap();
            assert!(code.validate().is_ok());
            assert_eq!(code.as_str().len(), REDEMPTION_CODE_LEN);
        }
    }

    #[test]
    fn minted_codes_never_contain_ambiguous_symbols() {
        for _ in 0..64 {
            let code = mint_code_os().unwrap();
            assert!(!code.as_str().contains(['I', 'O', '0', '1']));
        }
    }

    #[test]
    fn every_alphabet_index_maps_into_the_alphabet() {
        // Bytes 0..=255 all land on a valid symbol through the mask.
        let mut rng = FixedRng((0u8..=255).collect());
        let mut seen = BTreeSet::new();
        for _ in 0..32 {
            let code = mint_code(&mut rng).unwrap();
            for b in code.as_str().bytes() {
                assert!(REDEMPTION_CODE_ALPHABET.contains(&b));
                seen.insert(b);
            }
        }
        assert_eq!(seen.len(), REDEMPTION_CODE_ALPHABET.len());
    }

    #[test]
    fn distinct_entropy_yields_distinct_codes() {
        let mut codes = BTreeSet::new();
        for _ in 0..256 {
            codes.insert(mint_code_os().unwrap());
        }
        // 32^8 candidates; 256 draws colliding would mean a broken source.
        assert!(codes.len() > 250);
    }
}
