// Inbound webhook module
//
// Handles:
// - HMAC-SHA256 authentication of raw callback bodies
// - Routing verified events to topic handlers
// - Built-in handlers for orders, products, customers and app uninstalls
// - Registering a shop's topics with the Admin API

pub mod dispatcher;
pub mod event;
pub mod handlers;
pub mod subscription;
pub mod verifier;

pub use dispatcher::{DispatchReport, WebhookDispatcher, WebhookHandler};
pub use event::{WebhookEvent, WebhookTopic, SHOP_DOMAIN_HEADER, TOPIC_HEADER};
pub use handlers::{
    default_handlers, AppUninstalledHandler, CustomerHandler, OrderHandler, ProductHandler,
};
pub use subscription::{callback_address, subscribe_webhooks, Subscription, SubscriptionError};
pub use verifier::{sign, verify, VerifyError, WebhookVerifier, HMAC_HEADER};
