//! Registration pass: builds the scope tree with a context stack.
//!
//! A [`TestBuilder`] is one registration context. It is a plain value,
//! never process-global state, so independent passes (for example a
//! host re-registering the same suite on another thread to look up a
//! single test) cannot interfere with each other.

use crate::executor::TestContext;
use crate::result::{Failure, FinishedTestContext};
use crate::scope::{Scope, SourceLocation, TestBlock, TestBody, TestOptions};
use futures::FutureExt;
use std::fmt::Display;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe, Location};
use std::sync::Arc;
use thiserror::Error;

/// Errors raised by misuse of the registration API. All of them are
/// fatal to the registration pass; nothing runs afterwards.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuilderError {
    #[error("no current scope: call describe before registering hooks or tests")]
    NoCurrentScope,
    #[error("nothing registered: call describe before consuming the tree")]
    NothingRegistered,
    #[error("the root scope was already consumed")]
    AlreadyConsumed,
    #[error("consume called while a describe block is still open")]
    ConsumeDuringRegistration,
    #[error("a root suite already exists: a registration pass has exactly one root")]
    MultipleRoots,
}

/// Builds one scope tree during a single synchronous registration pass.
#[derive(Debug, Default)]
pub struct TestBuilder {
    stack: Vec<Scope>,
    root: Option<Scope>,
    consumed: bool,
}

impl TestBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a suite. The first call creates the root; nested calls
    /// attach children to the current scope. The body runs
    /// synchronously and every registration made inside it attaches to
    /// the new scope. The parent scope is restored when the body
    /// returns, and also when it panics, so a later declaration cannot
    /// attach to the wrong parent.
    ///
    /// # Errors
    /// Returns `MultipleRoots` for a second top-level suite and
    /// `AlreadyConsumed` when the root was already consumed.
    pub fn describe<F>(
        &mut self,
        description: impl Into<String>,
        body: F,
    ) -> Result<(), BuilderError>
    where
        F: FnOnce(&mut Self) -> Result<(), BuilderError>,
    {
        self.enter_scope(description.into())?;
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| body(self)));
        self.exit_scope();
        match outcome {
            Ok(result) => result,
            Err(payload) => panic::resume_unwind(payload),
        }
    }

    fn enter_scope(&mut self, description: String) -> Result<(), BuilderError> {
        if let Some(parent) = self.stack.last_mut() {
            let index = parent.allocate_index();
            let mut path = parent.path.clone();
            path.push(index);
            self.stack.push(Scope::new(description, path, index));
            return Ok(());
        }
        if self.consumed {
            return Err(BuilderError::AlreadyConsumed);
        }
        if self.root.is_some() {
            return Err(BuilderError::MultipleRoots);
        }
        self.stack.push(Scope::new(description, Vec::new(), 0));
        Ok(())
    }

    fn exit_scope(&mut self) {
        let Some(scope) = self.stack.pop() else {
            return;
        };
        match self.stack.last_mut() {
            Some(parent) => parent.children.push(scope),
            None => self.root = Some(scope),
        }
    }

    fn current_scope_mut(&mut self) -> Result<&mut Scope, BuilderError> {
        self.stack.last_mut().ok_or(BuilderError::NoCurrentScope)
    }

    /// Register a hook that runs once before the first test under the
    /// current scope.
    ///
    /// # Errors
    /// Returns `NoCurrentScope` when called outside a `describe` block.
    pub fn before_all<F, Fut>(&mut self, mut hook: F) -> Result<(), BuilderError>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), Failure>> + Send + 'static,
    {
        self.current_scope_mut()?
            .before_all
            .push(Box::new(move || hook().boxed()));
        Ok(())
    }

    /// Register a hook that runs before every test under the current
    /// scope, outermost scope first.
    ///
    /// # Errors
    /// Returns `NoCurrentScope` when called outside a `describe` block.
    pub fn before_each<F, Fut>(&mut self, mut hook: F) -> Result<(), BuilderError>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), Failure>> + Send + 'static,
    {
        self.current_scope_mut()?
            .before_each
            .push(Box::new(move || hook().boxed()));
        Ok(())
    }

    /// Register a hook that runs after every test under the current
    /// scope, receiving the finished test's outcome, output and
    /// duration. Runs in the same outermost-first order as
    /// `before_each`.
    ///
    /// # Errors
    /// Returns `NoCurrentScope` when called outside a `describe` block.
    pub fn after_each<F, Fut>(&mut self, mut hook: F) -> Result<(), BuilderError>
    where
        F: FnMut(FinishedTestContext) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), Failure>> + Send + 'static,
    {
        self.current_scope_mut()?
            .after_each
            .push(Box::new(move |cx| hook(cx).boxed()));
        Ok(())
    }

    /// Register a hook that runs once after the last test under the
    /// current scope (nested suites included).
    ///
    /// # Errors
    /// Returns `NoCurrentScope` when called outside a `describe` block.
    pub fn after_all<F, Fut>(&mut self, mut hook: F) -> Result<(), BuilderError>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), Failure>> + Send + 'static,
    {
        self.current_scope_mut()?
            .after_all
            .push(Box::new(move || hook().boxed()));
        Ok(())
    }

    /// Register one leaf test.
    ///
    /// # Errors
    /// Returns `NoCurrentScope` when called outside a `describe` block.
    #[track_caller]
    pub fn it<F, Fut>(&mut self, description: impl Into<String>, body: F) -> Result<(), BuilderError>
    where
        F: FnOnce(TestContext) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), Failure>> + Send + 'static,
    {
        let location = SourceLocation::from(Location::caller());
        self.add_test(
            description.into(),
            TestOptions::default(),
            false,
            false,
            location,
            Box::new(move |cx| body(cx).boxed()),
        )
    }

    /// Register one leaf test with explicit options (timeout).
    ///
    /// # Errors
    /// Returns `NoCurrentScope` when called outside a `describe` block.
    #[track_caller]
    pub fn it_with<F, Fut>(
        &mut self,
        description: impl Into<String>,
        options: TestOptions,
        body: F,
    ) -> Result<(), BuilderError>
    where
        F: FnOnce(TestContext) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), Failure>> + Send + 'static,
    {
        let location = SourceLocation::from(Location::caller());
        self.add_test(
            description.into(),
            options,
            false,
            false,
            location,
            Box::new(move |cx| body(cx).boxed()),
        )
    }

    /// Register a leaf test and restrict the run to tests marked this
    /// way.
    ///
    /// # Errors
    /// Returns `NoCurrentScope` when called outside a `describe` block.
    #[track_caller]
    pub fn only<F, Fut>(
        &mut self,
        description: impl Into<String>,
        body: F,
    ) -> Result<(), BuilderError>
    where
        F: FnOnce(TestContext) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), Failure>> + Send + 'static,
    {
        let location = SourceLocation::from(Location::caller());
        self.add_test(
            description.into(),
            TestOptions::default(),
            true,
            false,
            location,
            Box::new(move |cx| body(cx).boxed()),
        )
    }

    /// Register a leaf test that is reported as skipped without
    /// executing its body.
    ///
    /// # Errors
    /// Returns `NoCurrentScope` when called outside a `describe` block.
    #[track_caller]
    pub fn skip<F, Fut>(
        &mut self,
        description: impl Into<String>,
        body: F,
    ) -> Result<(), BuilderError>
    where
        F: FnOnce(TestContext) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), Failure>> + Send + 'static,
    {
        let location = SourceLocation::from(Location::caller());
        self.add_test(
            description.into(),
            TestOptions::default(),
            false,
            true,
            location,
            Box::new(move |cx| body(cx).boxed()),
        )
    }

    /// Register one leaf test per value, naming each from a positional
    /// format template (`{0}` or the first `{}` is replaced with the
    /// value's `Display` output).
    ///
    /// # Errors
    /// Returns `NoCurrentScope` when called outside a `describe` block.
    #[track_caller]
    pub fn it_each<T, I, F, Fut>(
        &mut self,
        values: I,
        template: &str,
        body: F,
    ) -> Result<(), BuilderError>
    where
        T: Display + Send + 'static,
        I: IntoIterator<Item = T>,
        F: Fn(T, TestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), Failure>> + Send + 'static,
    {
        let location = SourceLocation::from(Location::caller());
        let template = template.to_string();
        self.each_inner(
            values,
            &move |value: &T| format_description(&template, value),
            false,
            false,
            location,
            body,
        )
    }

    /// Register one leaf test per value, naming each with a resolver
    /// function. This is the parameterized primitive; `it_each` and the
    /// `only`/`skip` variants are sugar over it.
    ///
    /// # Errors
    /// Returns `NoCurrentScope` when called outside a `describe` block.
    #[track_caller]
    pub fn it_each_resolved<T, I, D, F, Fut>(
        &mut self,
        values: I,
        describe_as: D,
        body: F,
    ) -> Result<(), BuilderError>
    where
        T: Send + 'static,
        I: IntoIterator<Item = T>,
        D: Fn(&T) -> String,
        F: Fn(T, TestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), Failure>> + Send + 'static,
    {
        let location = SourceLocation::from(Location::caller());
        self.each_inner(values, &describe_as, false, false, location, body)
    }

    /// Parameterized form of [`TestBuilder::only`].
    ///
    /// # Errors
    /// Returns `NoCurrentScope` when called outside a `describe` block.
    #[track_caller]
    pub fn only_each<T, I, F, Fut>(
        &mut self,
        values: I,
        template: &str,
        body: F,
    ) -> Result<(), BuilderError>
    where
        T: Display + Send + 'static,
        I: IntoIterator<Item = T>,
        F: Fn(T, TestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), Failure>> + Send + 'static,
    {
        let location = SourceLocation::from(Location::caller());
        let template = template.to_string();
        self.each_inner(
            values,
            &move |value: &T| format_description(&template, value),
            true,
            false,
            location,
            body,
        )
    }

    /// Parameterized form of [`TestBuilder::skip`].
    ///
    /// # Errors
    /// Returns `NoCurrentScope` when called outside a `describe` block.
    #[track_caller]
    pub fn skip_each<T, I, F, Fut>(
        &mut self,
        values: I,
        template: &str,
        body: F,
    ) -> Result<(), BuilderError>
    where
        T: Display + Send + 'static,
        I: IntoIterator<Item = T>,
        F: Fn(T, TestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), Failure>> + Send + 'static,
    {
        let location = SourceLocation::from(Location::caller());
        let template = template.to_string();
        self.each_inner(
            values,
            &move |value: &T| format_description(&template, value),
            false,
            true,
            location,
            body,
        )
    }

    fn each_inner<T, I, F, Fut>(
        &mut self,
        values: I,
        describe_as: &dyn Fn(&T) -> String,
        is_only: bool,
        is_skipped: bool,
        location: SourceLocation,
        body: F,
    ) -> Result<(), BuilderError>
    where
        T: Send + 'static,
        I: IntoIterator<Item = T>,
        F: Fn(T, TestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), Failure>> + Send + 'static,
    {
        let body = Arc::new(body);
        for value in values {
            let description = describe_as(&value);
            let body = Arc::clone(&body);
            self.add_test(
                description,
                TestOptions::default(),
                is_only,
                is_skipped,
                location,
                Box::new(move |cx| body(value, cx).boxed()),
            )?;
        }
        Ok(())
    }

    fn add_test(
        &mut self,
        description: String,
        options: TestOptions,
        is_only: bool,
        is_skipped: bool,
        location: SourceLocation,
        body: TestBody,
    ) -> Result<(), BuilderError> {
        let scope = self.current_scope_mut()?;
        let index = scope.allocate_index();
        scope.tests.push(TestBlock {
            description,
            location,
            is_only,
            is_skipped,
            options,
            index,
            body,
        });
        Ok(())
    }

    /// Transfer ownership of the completed root scope to the caller and
    /// clear the builder's registration state.
    ///
    /// # Errors
    /// One-shot: consuming twice (`AlreadyConsumed`), consuming before
    /// anything was registered (`NothingRegistered`), or consuming
    /// inside an open `describe` block (`ConsumeDuringRegistration`)
    /// is a usage error.
    pub fn consume(&mut self) -> Result<Scope, BuilderError> {
        if !self.stack.is_empty() {
            return Err(BuilderError::ConsumeDuringRegistration);
        }
        match self.root.take() {
            Some(root) => {
                self.consumed = true;
                Ok(root)
            }
            None if self.consumed => Err(BuilderError::AlreadyConsumed),
            None => Err(BuilderError::NothingRegistered),
        }
    }
}

/// Render a parameterized test description from a positional template:
/// every `{0}` (or, failing that, the first `{}`) is replaced with the
/// value's `Display` output. A template without a placeholder is used
/// verbatim.
#[must_use]
pub fn format_description<T: Display>(template: &str, value: &T) -> String {
    let rendered = value.to_string();
    if template.contains("{0}") {
        template.replace("{0}", &rendered)
    } else if template.contains("{}") {
        template.replacen("{}", &rendered, 1)
    } else {
        template.to_string()
    }
}
