//! BoxChatProvider -- object-safe dynamic dispatch wrapper for ChatProvider.
//!
//! 1. Define an object-safe `ChatProviderDyn` trait with boxed futures
//! 2. Blanket-impl `ChatProviderDyn` for all `T: ChatProvider`
//! 3. `BoxChatProvider` wraps `Box<dyn ChatProviderDyn>` and delegates

use std::future::Future;
use std::pin::Pin;

use kizuna_types::llm::{ChatExchange, ChatRequest, ProviderError};

use super::provider::ChatProvider;

/// Object-safe version of [`ChatProvider`] with boxed futures.
///
/// Exists solely to enable dynamic dispatch; a blanket implementation is
/// provided for all types implementing `ChatProvider`.
pub trait ChatProviderDyn: Send + Sync {
    fn name(&self) -> &'static str;

    fn send_boxed<'a>(
        &'a self,
        request: &'a ChatRequest,
    ) -> Pin<Box<dyn Future<Output = Result<ChatExchange, ProviderError>> + Send + 'a>>;
}

impl<T: ChatProvider> ChatProviderDyn for T {
    fn name(&self) -> &'static str {
        ChatProvider::name(self)
    }

    fn send_boxed<'a>(
        &'a self,
        request: &'a ChatRequest,
    ) -> Pin<Box<dyn Future<Output = Result<ChatExchange, ProviderError>> + Send + 'a>> {
        Box::pin(self.send(request))
    }
}

/// Type-erased chat provider for runtime protocol selection.
///
/// Since `ChatProvider` uses RPITIT it cannot be a trait object directly;
/// `BoxChatProvider` provides equivalent methods delegating to the inner
/// `ChatProviderDyn` object.
pub struct BoxChatProvider {
    inner: Box<dyn ChatProviderDyn + Send + Sync>,
}

impl BoxChatProvider {
    /// Wrap a concrete `ChatProvider` in a type-erased box.
    pub fn new<T: ChatProvider + 'static>(provider: T) -> Self {
        Self {
            inner: Box::new(provider),
        }
    }

    /// Wire protocol name of the wrapped adapter.
    pub fn name(&self) -> &'static str {
        self.inner.name()
    }

    /// Send one completion round trip.
    pub async fn send(&self, request: &ChatRequest) -> Result<ChatExchange, ProviderError> {
        self.inner.send_boxed(request).await
    }
}
