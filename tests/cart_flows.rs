//! Cart behavior tests: merge-on-add, guest claiming and the cart-to-order
//! handoff at checkout.

use rust_decimal::Decimal;
use uuid::Uuid;

use frostline_commerce::{Cart, LineItem, Money, Order};

fn line(variant: Uuid, quantity: u32, cents: i64) -> LineItem {
    LineItem::new(
        Uuid::new_v4(),
        variant,
        "Smart Thermostat",
        "Pro",
        "FL-TH-PRO",
        quantity,
        Money::new(Decimal::new(cents, 2), "USD"),
    )
    .unwrap()
}

#[test]
fn repeated_adds_collapse_into_one_line() {
    let mut cart = Cart::for_user(Uuid::new_v4(), "USD");
    let variant = Uuid::new_v4();
    cart.add_item(line(variant, 2, 99999)).unwrap();
    cart.add_item(line(variant, 3, 99999)).unwrap();

    assert_eq!(cart.items().len(), 1);
    assert_eq!(cart.items()[0].quantity(), 5);
    assert_eq!(cart.subtotal().amount(), Decimal::new(499995, 2));
}

#[test]
fn derived_values_hold_after_arbitrary_sequences() {
    let mut cart = Cart::for_session("sess-abc", "USD");
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    let c = Uuid::new_v4();

    cart.add_item(line(a, 1, 12999)).unwrap();
    cart.add_item(line(b, 4, 550)).unwrap();
    cart.add_item(line(a, 2, 12999)).unwrap();
    cart.update_item_quantity(b, 2).unwrap();
    cart.add_item(line(c, 1, 89900)).unwrap();
    cart.remove_item(c);
    cart.update_item_quantity(a, 0).unwrap();

    let expected_items: u32 = cart.items().iter().map(|i| i.quantity()).sum();
    let expected_subtotal: Decimal = cart.items().iter().map(|i| i.line_total().amount()).sum();
    assert_eq!(cart.total_items(), expected_items);
    assert_eq!(cart.subtotal().amount(), expected_subtotal);
    assert_eq!(cart.items().len(), 1);
    assert_eq!(cart.subtotal().amount(), Decimal::new(1100, 2));
}

#[test]
fn guest_cart_claim_then_merge() {
    let user = Uuid::new_v4();
    let shared = Uuid::new_v4();

    let mut user_cart = Cart::for_user(user, "USD");
    user_cart.add_item(line(shared, 1, 45000)).unwrap();

    let mut guest = Cart::for_session("sess-guest", "USD");
    guest.add_item(line(shared, 1, 47000)).unwrap();
    guest.add_item(line(Uuid::new_v4(), 2, 1500)).unwrap();
    guest.set_user(user);
    assert!(guest.session_id().is_none());

    user_cart.merge(guest).unwrap();
    assert_eq!(user_cart.items().len(), 2);
    assert_eq!(user_cart.item(shared).unwrap().quantity(), 2);
    // merged line keeps the user cart's price: 2 × 450.00 + 2 × 15.00
    assert_eq!(user_cart.subtotal().amount(), Decimal::new(93000, 2));
}

#[test]
fn checkout_carries_cart_lines_into_the_order() {
    let mut cart = Cart::for_session("sess-checkout", "USD");
    cart.add_item(line(Uuid::new_v4(), 2, 15000)).unwrap();
    cart.add_item(line(Uuid::new_v4(), 1, 20000)).unwrap();

    let mut order = Order::new("ORD-2026-077", "buyer@test.com", cart.currency()).unwrap();
    for item in cart.items() {
        order.add_item(item.clone()).unwrap();
    }
    order.set_shipping_cost(Decimal::new(2500, 2)).unwrap();
    order.set_tax_amount(Decimal::new(3000, 2)).unwrap();
    order.set_discount_amount(Decimal::new(1000, 2)).unwrap();

    assert_eq!(order.subtotal().amount(), cart.subtotal().amount());
    assert_eq!(order.total().amount(), Decimal::new(54500, 2));

    cart.clear();
    assert!(cart.is_empty());
    assert_eq!(cart.subtotal().amount(), Decimal::ZERO);
    assert_eq!(cart.total_items(), 0);
}
