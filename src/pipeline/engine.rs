//! Token pipeline orchestration.
//!
//! [`TokenPipeline`] owns every stateful piece (recipe cache, rate limiter,
//! collaborators) and drives the generate and verify state machines. It is
//! `Send + Sync`; share it behind an `Arc` across worker threads or tasks.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, trace, warn};

use crate::audit::{AuditEvent, AuditOutcome, AuditRecord, AuditSink, NullAuditSink};
use crate::auth::{RateDecision, RateLimiter, RevocationStore, Signer};
use crate::claims::{
    decode_claims, decode_context, encode_frame, split_frame, Claims, Context, Fields,
};
use crate::codec::{camouflage, deobfuscate, obfuscate, MAX_TOKEN_LEN};
use crate::config::TokenSettings;
use crate::crypto::{LayeredCipher, MasterSecret, RandomSource, SystemRandomSource};
use crate::error::{Rejection, TokenError, TokenResult};
use crate::recipe::{Recipe, RecipeManager};

use super::batch::{GenerateRequest, VerifyRequest};
use super::clock::{Clock, SystemClock};
use super::policy::ContextPolicy;
use super::stage::{GenerateStage, VerifyStage};
use super::token::{Token, TokenId, TokenInfo, VerifiedToken};

/// Issues, verifies, refreshes and revokes tokens.
pub struct TokenPipeline {
    settings: TokenSettings,
    recipes: RecipeManager,
    signer: Signer,
    cipher: LayeredCipher,
    policy: ContextPolicy,
    /// `None` when `rate_limit_per_minute` is 0.
    rate_limiter: Option<Arc<RateLimiter>>,
    clock: Arc<dyn Clock>,
    random: Arc<dyn RandomSource>,
    revocations: Option<Arc<dyn RevocationStore>>,
    audit: Arc<dyn AuditSink>,
}

impl TokenPipeline {
    /// Build a pipeline with the system clock, the system random source, no
    /// revocation store and auditing disabled.
    pub fn new(secret: MasterSecret, settings: TokenSettings) -> TokenResult<Self> {
        settings.validate()?;

        let secret = Arc::new(secret);
        let recipes = RecipeManager::new(
            Arc::clone(&secret),
            settings.profile.layer_count(),
            settings.recipe_rotation_interval_seconds,
            settings.recipe_cache_size,
        )?;
        let signer = Signer::new(&secret)?;
        let cipher = LayeredCipher::new(&secret);
        let rate_limiter = (settings.rate_limit_per_minute > 0)
            .then(|| Arc::new(RateLimiter::per_minute(settings.rate_limit_per_minute)));

        Ok(Self {
            policy: ContextPolicy::from_settings(&settings),
            settings,
            recipes,
            signer,
            cipher,
            rate_limiter,
            clock: Arc::new(SystemClock),
            random: Arc::new(SystemRandomSource::new()),
            revocations: None,
            audit: Arc::new(NullAuditSink),
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_random(mut self, random: Arc<dyn RandomSource>) -> Self {
        self.random = random;
        self
    }

    /// Consult `store` during verification and forward `revoke` to it.
    pub fn with_revocation_store(mut self, store: Arc<dyn RevocationStore>) -> Self {
        self.revocations = Some(store);
        self
    }

    pub fn with_audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = sink;
        self
    }

    pub fn settings(&self) -> &TokenSettings {
        &self.settings
    }

    pub fn recipes(&self) -> &RecipeManager {
        &self.recipes
    }

    pub fn rate_limiter(&self) -> Option<&Arc<RateLimiter>> {
        self.rate_limiter.as_ref()
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    /// Number of layer decryptions attempted so far.
    pub fn decrypt_attempts(&self) -> u64 {
        self.cipher.decrypt_attempts()
    }

    /// Issue a token for `user_id`.
    ///
    /// `ttl` defaults to the configured TTL. Without a custom recipe the
    /// recipe active at the current rotation bucket is used.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` for an empty user id, a zero or oversized TTL, or an
    /// unusable custom recipe. `RateLimitExceeded` when the user has used up
    /// its issuance quota.
    pub fn generate(
        &self,
        user_id: &str,
        fields: Fields,
        context: Option<&Context>,
        ttl: Option<Duration>,
        recipe: Option<&Recipe>,
    ) -> TokenResult<Token> {
        let now = self.clock.now();
        let result = self.issue(user_id, fields, context, ttl, recipe, now);
        self.audit_issue(AuditEvent::Generate, user_id, now, &result);
        result.map(|(token, _)| token)
    }

    /// Verify a token and return its claims.
    ///
    /// `user_id` and `context` are optional bindings to check; omitting them
    /// skips the corresponding comparison. A custom recipe must be the one the
    /// token was generated with.
    pub fn verify(
        &self,
        token: &str,
        user_id: Option<&str>,
        context: Option<&Context>,
        recipe: Option<&Recipe>,
    ) -> TokenResult<VerifiedToken> {
        self.verify_at(token, user_id, context, recipe, self.clock.now())
    }

    /// Refresh a token using the configured refresh window.
    ///
    /// Returns `Ok(None)` when the token is valid but not yet due.
    pub fn refresh(&self, token: &str, user_id: &str) -> TokenResult<Option<Token>> {
        self.refresh_with(token, user_id, None, None, self.settings.refresh_window())
    }

    /// Refresh with an explicit context, recipe and threshold.
    ///
    /// The new token keeps the original lifetime, fields and bound context,
    /// and records the old token as its parent. A failed verification is
    /// returned as is.
    pub fn refresh_with(
        &self,
        token: &str,
        user_id: &str,
        context: Option<&Context>,
        recipe: Option<&Recipe>,
        threshold: Duration,
    ) -> TokenResult<Option<Token>> {
        let now = self.clock.now();
        let verified = self.verify_at(token, Some(user_id), context, recipe, now)?;

        let remaining = verified.claims.remaining(now);
        if remaining > threshold.as_secs() {
            debug!(
                user_id = %user_id,
                remaining,
                threshold = threshold.as_secs(),
                "Refresh not due"
            );
            self.audit.emit(
                AuditRecord::new(AuditEvent::Refresh, AuditOutcome::NoOp, now)
                    .with_token(token)
                    .with_subject(user_id)
                    .with_recipe_version(verified.recipe_version)
                    .with_reason("outside_refresh_window"),
            );
            return Ok(None);
        }

        let result = self.reissue(&verified, recipe, now);
        self.audit_issue(AuditEvent::Refresh, user_id, now, &result);
        result.map(|(token, _)| Some(token))
    }

    /// Mark a token as revoked in the configured store.
    ///
    /// The token must authenticate so its signed identifier can be read. It
    /// does not need to be unexpired or bound to any particular context.
    pub fn revoke(&self, token: &str) -> TokenResult<()> {
        self.revoke_with(token, None)
    }

    /// Revoke a token that was generated with a custom recipe.
    pub fn revoke_with(&self, token: &str, recipe: Option<&Recipe>) -> TokenResult<()> {
        let now = self.clock.now();
        match self.revoke_inner(token, recipe, now) {
            Ok(id) => {
                info!(token_id = %id, "Token revoked");
                self.audit.emit(
                    AuditRecord::new(AuditEvent::Revoke, AuditOutcome::Success, now)
                        .with_token(token),
                );
                Ok(())
            }
            Err(rejection) => {
                warn!(reason = rejection.reason, "Revocation failed");
                self.audit.emit(
                    AuditRecord::failure(AuditEvent::Revoke, now, &rejection.error, rejection.reason)
                        .with_token(token),
                );
                Err(rejection.into())
            }
        }
    }

    /// Decode the structure of a token without touching any key material.
    pub fn inspect(&self, token: &str) -> TokenResult<TokenInfo> {
        let grouped = camouflage::verify_checksum(token)?;
        let (recipe_version, body) = camouflage::decode(grouped)?;
        Ok(TokenInfo {
            recipe_version,
            body_len: body.len(),
        })
    }

    /// Generate one token per request.
    ///
    /// The outer error rejects the batch as a whole; item failures are
    /// reported per item.
    pub fn generate_batch(
        &self,
        requests: &[GenerateRequest],
    ) -> TokenResult<Vec<TokenResult<Token>>> {
        self.check_batch(requests.len())?;
        Ok(requests
            .iter()
            .map(|request| {
                self.generate(
                    &request.user_id,
                    request.fields.clone(),
                    request.context.as_ref(),
                    request.ttl,
                    request.recipe.as_ref(),
                )
            })
            .collect())
    }

    /// Verify one token per request.
    pub fn verify_batch(
        &self,
        requests: &[VerifyRequest],
    ) -> TokenResult<Vec<TokenResult<VerifiedToken>>> {
        self.check_batch(requests.len())?;
        Ok(requests
            .iter()
            .map(|request| {
                self.verify(
                    &request.token,
                    request.user_id.as_deref(),
                    request.context.as_ref(),
                    request.recipe.as_ref(),
                )
            })
            .collect())
    }

    fn check_batch(&self, len: usize) -> TokenResult<()> {
        if len > self.settings.max_batch_size {
            return Err(TokenError::invalid_config(format!(
                "batch of {} exceeds max_batch_size {}",
                len, self.settings.max_batch_size
            )));
        }
        Ok(())
    }

    fn issue(
        &self,
        user_id: &str,
        fields: Fields,
        context: Option<&Context>,
        ttl: Option<Duration>,
        recipe: Option<&Recipe>,
        now: u64,
    ) -> TokenResult<(Token, u16)> {
        if user_id.is_empty() {
            return Err(TokenError::invalid_config("user_id must not be empty"));
        }
        let lifetime = self.lifetime(ttl)?;
        if let Some(custom) = recipe {
            check_custom_recipe(custom, now)?;
        }
        self.admit(user_id, now)?;

        let claims = Claims {
            jti: TokenId::generate(self.random.as_ref())?,
            user_id: user_id.to_string(),
            issued_at: now,
            expires_at: now.saturating_add(lifetime),
            fields,
            parent: None,
            refresh_count: 0,
        };
        self.seal(&claims, context.cloned().unwrap_or_default(), recipe, now)
    }

    fn reissue(
        &self,
        verified: &VerifiedToken,
        recipe: Option<&Recipe>,
        now: u64,
    ) -> TokenResult<(Token, u16)> {
        if let Some(custom) = recipe {
            check_custom_recipe(custom, now)?;
        }
        let previous = &verified.claims;
        self.admit(&previous.user_id, now)?;

        let claims = Claims {
            jti: TokenId::generate(self.random.as_ref())?,
            user_id: previous.user_id.clone(),
            issued_at: now,
            expires_at: now.saturating_add(previous.lifetime()),
            fields: previous.fields.clone(),
            parent: Some(verified.token_id.clone()),
            refresh_count: previous.refresh_count.saturating_add(1),
        };
        self.seal(&claims, verified.context.clone(), recipe, now)
    }

    fn lifetime(&self, ttl: Option<Duration>) -> TokenResult<u64> {
        let secs = ttl.map_or(self.settings.default_ttl_seconds, |ttl| ttl.as_secs());
        if secs == 0 {
            return Err(TokenError::invalid_config("ttl must be at least one second"));
        }
        if secs > self.settings.max_ttl_seconds {
            return Err(TokenError::invalid_config(format!(
                "ttl {}s exceeds max_ttl_seconds {}",
                secs, self.settings.max_ttl_seconds
            )));
        }
        Ok(secs)
    }

    fn admit(&self, key: &str, now: u64) -> TokenResult<()> {
        let Some(limiter) = &self.rate_limiter else {
            return Ok(());
        };

        match limiter.check_and_record(key, now) {
            RateDecision::Allowed => Ok(()),
            RateDecision::Limited { retry_after_secs } => {
                warn!(key = %key, retry_after_secs, "Issuance rate limit exceeded");
                Err(TokenError::RateLimitExceeded {
                    key: key.to_string(),
                    limit: limiter.limit(),
                    retry_after_secs,
                })
            }
        }
    }

    /// Sign, encrypt, obfuscate and camouflage.
    fn seal(
        &self,
        claims: &Claims,
        context: Context,
        custom: Option<&Recipe>,
        now: u64,
    ) -> TokenResult<(Token, u16)> {
        let derived;
        let recipe = match custom {
            Some(recipe) => recipe,
            None => {
                derived = self.recipes.get_or_derive(now);
                derived.as_ref()
            }
        };
        let version = recipe.version;
        trace_generate(GenerateStage::Building, version);

        let frame = encode_frame(claims, &context, &self.signer)?;
        trace_generate(GenerateStage::Signed, version);

        let ciphertext = self.cipher.encrypt(recipe, &frame, self.random.as_ref())?;
        trace_generate(GenerateStage::Encrypted, version);

        let stream = obfuscate(recipe, &ciphertext, self.random.as_ref())?;
        trace_generate(GenerateStage::Obfuscated, version);

        let wire = camouflage::encode(version, &stream);
        if wire.len() > MAX_TOKEN_LEN {
            return Err(TokenError::invalid_config(format!(
                "token of {} bytes exceeds the {} byte limit, reduce the claim fields",
                wire.len(),
                MAX_TOKEN_LEN
            )));
        }
        trace_generate(GenerateStage::Camouflaged, version);

        Ok((Token::new(wire, claims.jti.clone()), version))
    }

    fn verify_at(
        &self,
        token: &str,
        user_id: Option<&str>,
        context: Option<&Context>,
        recipe: Option<&Recipe>,
        now: u64,
    ) -> TokenResult<VerifiedToken> {
        let mut run = VerifyRun::new();
        match self.open(&mut run, token, user_id, context, recipe, now) {
            Ok(verified) => {
                debug!(
                    user_id = %verified.claims.user_id,
                    recipe_version = verified.recipe_version,
                    "Token verified"
                );
                self.audit.emit(
                    AuditRecord::new(AuditEvent::Verify, AuditOutcome::Success, now)
                        .with_token(token)
                        .with_subject(verified.claims.user_id.as_str())
                        .with_recipe_version(verified.recipe_version),
                );
                Ok(verified)
            }
            Err(rejection) => {
                debug!(
                    stage = %run.stage,
                    reason = rejection.reason,
                    error = rejection.error.code(),
                    "Token rejected"
                );
                let reason = format!("{}:{}", run.stage, rejection.reason);
                let mut record =
                    AuditRecord::failure(AuditEvent::Verify, now, &rejection.error, &reason)
                        .with_token(token);
                if let Some(user_id) = user_id {
                    record = record.with_subject(user_id);
                }
                if let Some(version) = run.recipe_version {
                    record = record.with_recipe_version(version);
                }
                self.audit.emit(record);
                Err(rejection.into())
            }
        }
    }

    /// The verification chain. Each step short-circuits.
    fn open(
        &self,
        run: &mut VerifyRun,
        token: &str,
        user_id: Option<&str>,
        context: Option<&Context>,
        custom: Option<&Recipe>,
        now: u64,
    ) -> Result<VerifiedToken, Rejection> {
        let (claims, bound, version) = self.unseal(run, token, custom, now)?;

        if let Some(store) = &self.revocations {
            if store.is_revoked(&claims.jti) {
                return Err(Rejection::new(TokenError::Revoked, "revoked"));
            }
        }

        if let Some(user_id) = user_id {
            if user_id != claims.user_id {
                return Err(Rejection::context("user_mismatch"));
            }
        }
        if let Some(presented) = context {
            self.policy.check(&bound, presented)?;
        }
        run.advance(VerifyStage::ContextOk);

        if claims.is_expired(now) {
            return Err(Rejection::new(TokenError::Expired, "expired"));
        }
        run.advance(VerifyStage::Valid);

        Ok(VerifiedToken {
            token_id: claims.jti.clone(),
            claims,
            context: bound,
            recipe_version: version,
        })
    }

    /// Checksum through signature: everything needed to trust the payload.
    fn unseal(
        &self,
        run: &mut VerifyRun,
        token: &str,
        custom: Option<&Recipe>,
        now: u64,
    ) -> Result<(Claims, Context, u16), Rejection> {
        let grouped = camouflage::verify_checksum(token)?;
        run.advance(VerifyStage::ChecksumOk);

        let (version, stream) = camouflage::decode(grouped)?;
        run.recipe_version = Some(version);
        run.advance(VerifyStage::Decamouflaged);

        let resolved;
        let recipe = match custom {
            Some(recipe) => {
                if recipe.version != version {
                    return Err(Rejection::new(
                        TokenError::UnknownRecipeVersion,
                        "custom_recipe_version",
                    ));
                }
                if recipe.validate().is_err() {
                    return Err(Rejection::new(
                        TokenError::UnknownRecipeVersion,
                        "custom_recipe_invalid",
                    ));
                }
                recipe
            }
            None => {
                resolved = self.recipes.resolve(version, now).ok_or_else(|| {
                    Rejection::new(TokenError::UnknownRecipeVersion, "recipe_not_resident")
                })?;
                resolved.as_ref()
            }
        };

        let ciphertext = deobfuscate(recipe, &stream)?;
        run.advance(VerifyStage::Deobfuscated);

        let plaintext = self.cipher.decrypt(recipe, &ciphertext)?;
        run.advance(VerifyStage::Decrypted);

        let frame = split_frame(&plaintext)?;
        frame.verify(&self.signer)?;
        run.advance(VerifyStage::SignatureOk);

        let claims = decode_claims(&frame)?;
        let bound = decode_context(&frame)?;
        Ok((claims, bound, version))
    }

    fn revoke_inner(
        &self,
        token: &str,
        custom: Option<&Recipe>,
        now: u64,
    ) -> Result<TokenId, Rejection> {
        let store = self.revocations.as_ref().ok_or_else(|| {
            Rejection::new(
                TokenError::invalid_config("no revocation store configured"),
                "no_revocation_store",
            )
        })?;
        let (claims, _, _) = self.unseal(&mut VerifyRun::new(), token, custom, now)?;

        store.revoke(claims.jti.clone(), claims.expires_at);
        Ok(claims.jti)
    }

    fn audit_issue(
        &self,
        event: AuditEvent,
        user_id: &str,
        now: u64,
        result: &TokenResult<(Token, u16)>,
    ) {
        let record = match result {
            Ok((token, version)) => {
                debug!(user_id = %user_id, recipe_version = version, "Token issued");
                AuditRecord::new(event, AuditOutcome::Success, now)
                    .with_token(token.as_str())
                    .with_recipe_version(*version)
            }
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Token issuance failed");
                AuditRecord::failure(event, now, e, &e.code().to_ascii_lowercase())
            }
        };
        self.audit.emit(record.with_subject(user_id));
    }
}

fn check_custom_recipe(recipe: &Recipe, now: u64) -> TokenResult<()> {
    recipe.validate()?;
    if !recipe.is_active_at(now) {
        return Err(TokenError::invalid_config(format!(
            "custom recipe {} is not valid at {}",
            recipe.version, now
        )));
    }
    Ok(())
}

fn trace_generate(stage: GenerateStage, recipe_version: u16) {
    trace!(stage = %stage, recipe_version, "generate");
}

/// Progress of one verification, kept for logging and audit.
struct VerifyRun {
    stage: VerifyStage,
    recipe_version: Option<u16>,
}

impl VerifyRun {
    fn new() -> Self {
        Self {
            stage: VerifyStage::Received,
            recipe_version: None,
        }
    }

    fn advance(&mut self, next: VerifyStage) {
        trace!(from = %self.stage, to = %next, "verify");
        self.stage = next;
    }
}
