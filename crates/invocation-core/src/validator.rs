//! Invocation validation
//!
//! `access` decides whether an invocation may exercise the capability it
//! claims. The invocation is already signature-checked by the time it gets
//! here; what remains is audience, time bounds, capability shape and the
//! proof chain back to the resource owner.

use crate::capability::{Capability, CapabilityDescriptor, Caveats, ParsedCapability};
use crate::crypto::content_id;
use crate::did::Did;
use crate::error::{InvocationError, Result};
use crate::ucan::{Delegation, Invocation};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

/// Maximum number of delegations between the invoker and the resource owner
pub const MAX_PROOF_DEPTH: usize = 8;

/// Maximum number of proof and capability checks spent on one invocation
pub const MAX_PROOF_CHECKS: usize = 256;

/// Rejection reasons kept per level of an `Unauthorized` error
const MAX_CAUSES: usize = 16;

/// Environment an invocation is validated in
#[derive(Debug, Clone)]
pub struct ValidationContext {
    /// The service receiving invocations; must be their audience
    pub authority: Did,
    /// Reference time for time bounds
    pub now: DateTime<Utc>,
    /// Proof chain depth limit
    pub max_depth: usize,
}

impl ValidationContext {
    /// Context for `authority` at the current time
    pub fn new(authority: Did) -> Self {
        Self {
            authority,
            now: Utc::now(),
            max_depth: MAX_PROOF_DEPTH,
        }
    }

    /// Override the reference time
    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }
}

/// Proof that an invocation is authorized
#[derive(Debug, Clone)]
pub struct Authorization<C> {
    /// The invoked capability with typed caveats
    pub capability: ParsedCapability<C>,
    /// Principals from the invoker up to the resource owner
    pub chain: Vec<Did>,
}

/// Validate an invocation against a capability descriptor
pub fn access<C: Caveats>(
    invocation: &Invocation,
    descriptor: &CapabilityDescriptor<C>,
    ctx: &ValidationContext,
) -> Result<Authorization<C>> {
    if invocation.audience() != &ctx.authority {
        return Err(InvocationError::InvalidAudience {
            expected: ctx.authority.to_string(),
            actual: invocation.audience().to_string(),
        });
    }

    invocation.payload().validate_time(ctx.now)?;

    let claimed = invocation.capability();
    let capability = descriptor.parse(claimed)?;

    let mut search = ProofSearch::new(descriptor, ctx);
    let mut chain = vec![invocation.issuer().clone()];

    if let Err(causes) = search.authorize(claimed, invocation.issuer(), invocation.proofs(), 0, &mut chain) {
        let mut causes = causes.into_vec();
        if search.exhausted() {
            causes.push(format!("proof search stopped after {} checks", MAX_PROOF_CHECKS));
        }

        warn!(
            can = %claimed.can,
            with = %claimed.with,
            issuer = %invocation.issuer(),
            checks = search.checks,
            "Invocation not authorized"
        );

        return Err(InvocationError::Unauthorized {
            can: claimed.can.clone(),
            with: claimed.with.clone(),
            causes,
        });
    }

    debug!(can = %claimed.can, chain_len = chain.len(), checks = search.checks, "Invocation authorized");

    Ok(Authorization { capability, chain })
}

/// Rejection reasons, truncated to `MAX_CAUSES` entries
#[derive(Debug, Default)]
struct Causes {
    kept: Vec<String>,
    omitted: usize,
}

impl Causes {
    fn push(&mut self, cause: String) {
        if self.kept.len() < MAX_CAUSES {
            self.kept.push(cause);
        } else {
            self.omitted += 1;
        }
    }

    fn absorb(&mut self, proof_id: &str, nested: Causes) {
        for cause in nested.kept {
            self.push(format!("proof {}: {}", proof_id, cause));
        }
        self.omitted += nested.omitted;
    }

    fn into_vec(mut self) -> Vec<String> {
        if self.omitted > 0 {
            self.kept.push(format!("{} more causes omitted", self.omitted));
        }
        self.kept
    }
}

/// Depth-first search for a proof chain
///
/// Each proof is decoded and verified at most once, identical proofs and
/// capabilities are explored once per level, and a `(proof, capability)`
/// pair that already failed is not retried at the same or a greater depth.
/// The whole search is capped at `MAX_PROOF_CHECKS` steps.
struct ProofSearch<'a, C> {
    descriptor: &'a CapabilityDescriptor<C>,
    ctx: &'a ValidationContext,
    decoded: HashMap<String, std::result::Result<Delegation, String>>,
    rejected: HashMap<(String, usize), usize>,
    checks: usize,
}

impl<'a, C: Caveats> ProofSearch<'a, C> {
    fn new(descriptor: &'a CapabilityDescriptor<C>, ctx: &'a ValidationContext) -> Self {
        Self {
            descriptor,
            ctx,
            decoded: HashMap::new(),
            rejected: HashMap::new(),
            checks: 0,
        }
    }

    fn exhausted(&self) -> bool {
        self.checks >= MAX_PROOF_CHECKS
    }

    /// Count one step; `false` once the budget is spent
    fn step(&mut self) -> bool {
        if self.exhausted() {
            return false;
        }
        self.checks += 1;
        true
    }

    fn decode(&mut self, proof_id: &str, bytes: &[u8]) -> std::result::Result<Delegation, String> {
        self.decoded
            .entry(proof_id.to_string())
            .or_insert_with(|| Delegation::decode(bytes).map_err(|e| e.to_string()))
            .clone()
    }

    /// Find a path of proofs authorizing `issuer` to exercise `claimed`
    ///
    /// On success `chain` is extended with every delegating principal.
    fn authorize(
        &mut self,
        claimed: &Capability,
        issuer: &Did,
        proofs: &[Vec<u8>],
        depth: usize,
        chain: &mut Vec<Did>,
    ) -> std::result::Result<(), Causes> {
        // Resource owner speaks for itself
        if claimed.with == issuer.as_str() {
            return Ok(());
        }

        let mut causes = Causes::default();

        if proofs.is_empty() {
            causes.push(format!(
                "'{}' is not the owner of '{}' and presented no proofs",
                issuer, claimed.with
            ));
            return Err(causes);
        }

        if depth >= self.ctx.max_depth {
            causes.push(format!("proof chain exceeds {} delegations", self.ctx.max_depth));
            return Err(causes);
        }

        let mut seen_proofs = HashSet::new();

        for bytes in proofs {
            let proof_id = content_id(bytes);
            if !seen_proofs.insert(proof_id.clone()) {
                continue;
            }

            if !self.step() {
                return Err(causes);
            }

            let delegation = match self.decode(&proof_id, bytes) {
                Ok(delegation) => delegation,
                Err(e) => {
                    causes.push(format!("invalid proof: {}", e));
                    continue;
                }
            };

            if delegation.audience() != issuer {
                causes.push(format!(
                    "proof {} is addressed to '{}', not '{}'",
                    proof_id,
                    delegation.audience(),
                    issuer
                ));
                continue;
            }

            if let Err(e) = delegation.payload().validate_time(self.ctx.now) {
                causes.push(format!("proof {}: {}", proof_id, e));
                continue;
            }

            let mut seen_capabilities: Vec<&Capability> = Vec::new();

            for (index, delegated) in delegation.capabilities().iter().enumerate() {
                if seen_capabilities.contains(&delegated) {
                    continue;
                }
                seen_capabilities.push(delegated);

                if !delegated.covers_ability(&claimed.can) {
                    causes.push(format!(
                        "proof {} delegates '{}', which does not cover '{}'",
                        proof_id, delegated.can, claimed.can
                    ));
                    continue;
                }

                if let Err(e) = self.descriptor.derives(claimed, delegated) {
                    causes.push(format!("proof {}: {}", proof_id, e));
                    continue;
                }

                let key = (proof_id.clone(), index);
                if self.rejected.get(&key).is_some_and(|&failed_at| failed_at <= depth) {
                    continue;
                }

                if !self.step() {
                    return Err(causes);
                }

                let mark = chain.len();
                chain.push(delegation.issuer().clone());

                match self.authorize(
                    delegated,
                    delegation.issuer(),
                    delegation.payload().prf.as_slice(),
                    depth + 1,
                    chain,
                ) {
                    Ok(()) => return Ok(()),
                    Err(nested) => {
                        chain.truncate(mark);
                        self.rejected.insert(key, depth);
                        causes.absorb(&proof_id, nested);
                    }
                }
            }
        }

        Err(causes)
    }
}
