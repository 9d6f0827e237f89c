//! sea-orm entities. Aggregates keep their document shape (cart lines,
//! frozen order copies) in Json columns; hot scalars stay relational.

pub mod address;
pub mod cart;
pub mod coupon;
pub mod delivery_slot;
pub mod order;
pub mod order_line;
pub mod product;
pub mod product_variant;
pub mod sequence;
pub mod setting;
pub mod shared;
pub mod user;
pub mod wallet_entry;

pub use address::{Entity as Address, Model as AddressModel};
pub use cart::{CartLine, CartLines, Entity as Cart, Model as CartModel};
pub use coupon::{CouponKind, Entity as Coupon, Model as CouponModel};
pub use delivery_slot::{Entity as DeliverySlot, Model as DeliverySlotModel, SlotTiming};
pub use order::{
    Entity as Order, Model as OrderModel, OrderAddress, OrderSlot, OrderStatus, OrderUser,
    PaymentMethod, PaymentStatus,
};
pub use order_line::{Entity as OrderLine, Model as OrderLineModel};
pub use product::{Entity as Product, Model as ProductModel};
pub use product_variant::{Entity as ProductVariant, Model as ProductVariantModel};
pub use sequence::Entity as Sequence;
pub use setting::{Entity as Setting, Model as SettingModel};
pub use shared::{AppliedCoupon, Currency, GeoPoint, Tax, TaxType};
pub use user::{Entity as User, Model as UserModel};
pub use wallet_entry::{Entity as WalletEntry, WalletEntryType};
