//! Aggregates module
pub mod product;
pub mod order;
pub mod promo;
pub mod withdrawal;

pub use product::{ApprovalStatus, Category, NewProduct, Product, ProductError};
pub use order::{CustomerInfo, LineItem, Order, OrderDraft, OrderError, OrderStatus, PaymentMethod, PaymentStatus, ShippingAddress, StatusChange};
pub use promo::{DiscountBreakdown, DiscountType, NewPromoCode, PromoCode, PromoError};
pub use withdrawal::{Decision, SellerAccount, VerificationStatus, Withdrawal, WithdrawalError, WithdrawalStatus};
