//! Functional combinators over `Result` and `Option`.
//!
//! The step machinery threads validation failures and absent values through
//! these instead of control-flow errors: short-circuit on failure/absence,
//! identity on success/presence. Combinators are pure — all I/O lives in the
//! branches supplied by callers.

/// Eliminators and short-circuiting transforms for `Result`.
pub trait ResultExt<V, F> {
    /// Eliminate the result by invoking exactly one branch.
    fn fold<R, S, E>(self, on_success: S, on_failure: E) -> R
    where
        S: FnOnce(V) -> R,
        E: FnOnce(F) -> R;

    /// Chain a transformation that may itself fail, short-circuiting on the
    /// first failure.
    fn forward<U, N>(self, next: N) -> Result<U, F>
    where
        N: FnOnce(V) -> Result<U, F>;

    /// Transform only the failure branch, leaving success untouched.
    fn map_failure<G, M>(self, map: M) -> Result<V, G>
    where
        M: FnOnce(F) -> G;

    /// Async `fold`: exactly one branch future is created and awaited.
    fn fold_value_async<R, S, E, SFut, EFut>(
        self,
        on_success: S,
        on_failure: E,
    ) -> impl Future<Output = R>
    where
        S: FnOnce(V) -> SFut,
        E: FnOnce(F) -> EFut,
        SFut: Future<Output = R>,
        EFut: Future<Output = R>;

    /// Async `map_failure`: the mapping future runs only on the failure
    /// branch.
    fn map_failure_value_async<G, M, MFut>(self, map: M) -> impl Future<Output = Result<V, G>>
    where
        M: FnOnce(F) -> MFut,
        MFut: Future<Output = G>;
}

impl<V, F> ResultExt<V, F> for Result<V, F> {
    fn fold<R, S, E>(self, on_success: S, on_failure: E) -> R
    where
        S: FnOnce(V) -> R,
        E: FnOnce(F) -> R,
    {
        match self {
            Ok(value) => on_success(value),
            Err(failure) => on_failure(failure),
        }
    }

    fn forward<U, N>(self, next: N) -> Result<U, F>
    where
        N: FnOnce(V) -> Result<U, F>,
    {
        match self {
            Ok(value) => next(value),
            Err(failure) => Err(failure),
        }
    }

    fn map_failure<G, M>(self, map: M) -> Result<V, G>
    where
        M: FnOnce(F) -> G,
    {
        match self {
            Ok(value) => Ok(value),
            Err(failure) => Err(map(failure)),
        }
    }

    fn fold_value_async<R, S, E, SFut, EFut>(
        self,
        on_success: S,
        on_failure: E,
    ) -> impl Future<Output = R>
    where
        S: FnOnce(V) -> SFut,
        E: FnOnce(F) -> EFut,
        SFut: Future<Output = R>,
        EFut: Future<Output = R>,
    {
        async move {
            match self {
                Ok(value) => on_success(value).await,
                Err(failure) => on_failure(failure).await,
            }
        }
    }

    fn map_failure_value_async<G, M, MFut>(self, map: M) -> impl Future<Output = Result<V, G>>
    where
        M: FnOnce(F) -> MFut,
        MFut: Future<Output = G>,
    {
        async move {
            match self {
                Ok(value) => Ok(value),
                Err(failure) => Err(map(failure).await),
            }
        }
    }
}

/// Eliminators for `Option`. Absence is an expected condition (no cache yet,
/// no matching lookup entry), not a failure.
pub trait OptionExt<V> {
    /// Eliminate the option by invoking exactly one branch.
    fn fold<R, P, A>(self, on_present: P, on_absent: A) -> R
    where
        P: FnOnce(V) -> R,
        A: FnOnce() -> R;

    /// Async `fold`: exactly one branch future is created and awaited.
    fn fold_value_async<R, P, A, PFut, AFut>(
        self,
        on_present: P,
        on_absent: A,
    ) -> impl Future<Output = R>
    where
        P: FnOnce(V) -> PFut,
        A: FnOnce() -> AFut,
        PFut: Future<Output = R>,
        AFut: Future<Output = R>;
}

impl<V> OptionExt<V> for Option<V> {
    fn fold<R, P, A>(self, on_present: P, on_absent: A) -> R
    where
        P: FnOnce(V) -> R,
        A: FnOnce() -> R,
    {
        match self {
            Some(value) => on_present(value),
            None => on_absent(),
        }
    }

    fn fold_value_async<R, P, A, PFut, AFut>(
        self,
        on_present: P,
        on_absent: A,
    ) -> impl Future<Output = R>
    where
        P: FnOnce(V) -> PFut,
        A: FnOnce() -> AFut,
        PFut: Future<Output = R>,
        AFut: Future<Output = R>,
    {
        async move {
            match self {
                Some(value) => on_present(value).await,
                None => on_absent().await,
            }
        }
    }
}
