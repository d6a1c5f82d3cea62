//! End-to-end workshop lifecycle tests over the in-memory stack.

use garagekit_app::{
    AppError, CustomerDetails, CustomerPatch, JobCardPatch, NewJobCard, NewSparePart, NewUser,
    PartRequest, SparePartPatch, Workshop,
};
use garagekit_auth::{AuthPolicy, Identity, IdentityResolver, Role};
use garagekit_core::{GarageId, Money, UserId};
use garagekit_garages::GarageProfile;
use garagekit_inventory::SparePartId;
use garagekit_jobcards::{JobCardId, ServiceCharge};

fn policy() -> AuthPolicy {
    AuthPolicy {
        activation_codes: vec!["GK-2026".to_string()],
        super_admin_emails: vec!["ops@example.com".to_string()],
    }
}

fn profile(name: &str) -> GarageProfile {
    GarageProfile {
        name: name.to_string(),
        owner_name: "Bilal Ahmed".to_string(),
        phone: "0300-1112223".to_string(),
        email: "speedy@example.com".to_string(),
        logo: None,
    }
}

fn admin(garage_id: GarageId) -> Identity {
    Identity {
        user_id: UserId::new(),
        garage_id: Some(garage_id),
        role: Role::GarageAdmin,
    }
}

fn mechanic(garage_id: GarageId) -> Identity {
    Identity {
        user_id: UserId::new(),
        garage_id: Some(garage_id),
        role: Role::MechanicStaff,
    }
}

fn super_admin() -> Identity {
    Identity {
        user_id: UserId::new(),
        garage_id: None,
        role: Role::SuperAdmin,
    }
}

fn setup() -> (Workshop, GarageId, Identity) {
    garagekit_observability::init();
    let workshop = Workshop::new(policy());
    let garage_id = workshop
        .register_garage("GK-2026", profile("Speedy Motors"))
        .unwrap();
    let identity = admin(garage_id);
    (workshop, garage_id, identity)
}

fn brake_pads(workshop: &Workshop, identity: &Identity, quantity: i64) -> SparePartId {
    workshop
        .add_spare_part(
            identity,
            None,
            NewSparePart {
                part_number: "BRK-01".to_string(),
                name: "Brake Pads".to_string(),
                quantity,
                selling_price: Money::from_minor(20000),
                cost_price: Money::from_minor(12000),
                low_stock_threshold: None,
            },
        )
        .unwrap()
}

fn ali_raza() -> CustomerDetails {
    CustomerDetails {
        name: "Ali Raza".to_string(),
        phone: "0300-1234567".to_string(),
        bike_number: "KA-01-X 991".to_string(),
    }
}

fn brake_job(part_id: SparePartId) -> NewJobCard {
    NewJobCard {
        customer: ali_raza(),
        description: "brake noise at low speed".to_string(),
        service_charge: ServiceCharge::flat(Money::from_minor(15000)),
        parts: vec![PartRequest {
            part_id,
            quantity: 2,
        }],
    }
}

fn open_brake_job(workshop: &Workshop, identity: &Identity, part_id: SparePartId) -> JobCardId {
    workshop
        .open_job_card(identity, None, brake_job(part_id))
        .unwrap()
}

#[test]
fn completion_freezes_pricing_and_cuts_invoice() {
    let (workshop, _garage_id, identity) = setup();
    let part_id = brake_pads(&workshop, &identity, 3);
    let job_card_id = open_brake_job(&workshop, &identity, part_id);

    let estimate = workshop
        .estimate_job_card(&identity, None, job_card_id)
        .unwrap();
    assert_eq!(estimate, Money::from_minor(55000));

    let receipt = workshop
        .complete_job_card(&identity, None, job_card_id)
        .unwrap();
    assert_eq!(receipt.total_amount, Money::from_minor(55000));
    assert!(receipt.invoice_number.starts_with("INV-"));

    // Stock decremented by the reserved quantity.
    let part = workshop.part(&identity, None, part_id).unwrap();
    assert_eq!(part.quantity, 1);

    // Off the pending board.
    assert!(
        workshop
            .list_pending_job_cards(&identity, None)
            .unwrap()
            .is_empty()
    );

    // Invoice record and document exist.
    let invoice = workshop
        .invoice_for_job_card(&identity, None, job_card_id)
        .unwrap();
    assert_eq!(invoice.total_amount, Money::from_minor(55000));
    assert_eq!(invoice.document_url, receipt.document_url);

    let bytes = workshop
        .invoice_document(&identity, None, invoice.invoice_id)
        .unwrap();
    let rendered = String::from_utf8(bytes).unwrap();
    assert!(rendered.contains("Grand Total: Rs. 550.00"));
    assert!(rendered.contains("Ali Raza"));
    assert!(rendered.contains("Speedy Motors"));

    // Customer visit aggregates updated exactly once.
    let customers = workshop.list_customers(&identity, None).unwrap();
    assert_eq!(customers.len(), 1);
    assert_eq!(customers[0].total_jobs, 1);
    assert_eq!(customers[0].total_spent, Money::from_minor(55000));
}

#[test]
fn insufficient_stock_reports_every_shortage() {
    let (workshop, _garage_id, identity) = setup();
    let pads = brake_pads(&workshop, &identity, 1);
    let chain = workshop
        .add_spare_part(
            &identity,
            None,
            NewSparePart {
                part_number: "CHN-05".to_string(),
                name: "Drive Chain".to_string(),
                quantity: 2,
                selling_price: Money::from_minor(80000),
                cost_price: Money::from_minor(55000),
                low_stock_threshold: None,
            },
        )
        .unwrap();

    let job_card_id = workshop
        .open_job_card(
            &identity,
            None,
            NewJobCard {
                customer: ali_raza(),
                description: "full service".to_string(),
                service_charge: ServiceCharge::flat(Money::from_minor(15000)),
                parts: vec![
                    PartRequest {
                        part_id: pads,
                        quantity: 2,
                    },
                    PartRequest {
                        part_id: chain,
                        quantity: 5,
                    },
                ],
            },
        )
        .unwrap();

    let err = workshop
        .complete_job_card(&identity, None, job_card_id)
        .unwrap_err();
    match err {
        AppError::InsufficientStock(shortages) => {
            assert_eq!(shortages.len(), 2);
            let pads_short = shortages
                .iter()
                .find(|s| s.part_number == "BRK-01")
                .unwrap();
            assert_eq!(pads_short.requested, 2);
            assert_eq!(pads_short.available, 1);
            let chain_short = shortages
                .iter()
                .find(|s| s.part_number == "CHN-05")
                .unwrap();
            assert_eq!(chain_short.requested, 5);
            assert_eq!(chain_short.available, 2);
        }
        other => panic!("Expected InsufficientStock, got {other:?}"),
    }

    // Nothing was decremented and the card is still pending.
    assert_eq!(workshop.part(&identity, None, pads).unwrap().quantity, 1);
    assert_eq!(workshop.part(&identity, None, chain).unwrap().quantity, 2);
    assert_eq!(workshop.list_pending_job_cards(&identity, None).unwrap().len(), 1);
    assert!(workshop.list_invoices(&identity, None).unwrap().is_empty());
}

#[test]
fn completed_cards_reject_edits_and_repeat_completion() {
    let (workshop, _garage_id, identity) = setup();
    let part_id = brake_pads(&workshop, &identity, 3);
    let job_card_id = open_brake_job(&workshop, &identity, part_id);

    workshop
        .complete_job_card(&identity, None, job_card_id)
        .unwrap();

    let err = workshop
        .update_job_card(
            &identity,
            None,
            job_card_id,
            JobCardPatch {
                description: Some("changed my mind".to_string()),
                ..Default::default()
            },
        )
        .unwrap_err();
    assert_eq!(err.kind(), "invalid_state_transition");

    let err = workshop
        .complete_job_card(&identity, None, job_card_id)
        .unwrap_err();
    assert_eq!(err.kind(), "invalid_state_transition");

    // Exactly one invoice, and the repeat attempt touched no stock.
    assert_eq!(workshop.list_invoices(&identity, None).unwrap().len(), 1);
    assert_eq!(workshop.part(&identity, None, part_id).unwrap().quantity, 1);
}

#[test]
fn catalogue_edits_do_not_reach_frozen_totals() {
    let (workshop, _garage_id, identity) = setup();
    let part_id = brake_pads(&workshop, &identity, 3);
    let job_card_id = open_brake_job(&workshop, &identity, part_id);

    let receipt = workshop
        .complete_job_card(&identity, None, job_card_id)
        .unwrap();
    let before = workshop
        .invoice_document(&identity, None, receipt.invoice_id)
        .unwrap();

    workshop
        .update_spare_part(
            &identity,
            None,
            part_id,
            SparePartPatch {
                selling_price: Some(Money::from_minor(99999)),
                ..Default::default()
            },
        )
        .unwrap();

    // Frozen totals are untouched by the price change.
    let invoice = workshop
        .invoice(&identity, None, receipt.invoice_id)
        .unwrap();
    assert_eq!(invoice.total_amount, Money::from_minor(55000));

    let card = workshop.job_card(&identity, None, job_card_id).unwrap();
    assert_eq!(card.total_amount, Some(Money::from_minor(55000)));

    let after = workshop
        .invoice_document(&identity, None, receipt.invoice_id)
        .unwrap();
    assert_eq!(before, after);

    // And there is no live estimate anymore to re-price.
    let err = workshop
        .estimate_job_card(&identity, None, job_card_id)
        .unwrap_err();
    assert_eq!(err.kind(), "invalid_state_transition");
}

#[test]
fn garage_scope_is_enforced() {
    let workshop = Workshop::new(policy());
    let garage_a = workshop
        .register_garage("GK-2026", profile("Speedy Motors"))
        .unwrap();
    let garage_b = workshop
        .register_garage("GK-2026", profile("City Bikes"))
        .unwrap();

    let admin_a = admin(garage_a);
    let part_id = brake_pads(&workshop, &admin_a, 3);
    let job_card_id = open_brake_job(&workshop, &admin_a, part_id);

    // A mechanic of garage B cannot target garage A, even explicitly.
    let mechanic_b = mechanic(garage_b);
    let err = workshop
        .complete_job_card(&mechanic_b, Some(garage_a), job_card_id)
        .unwrap_err();
    assert_eq!(err.kind(), "unauthorized");

    // Scoped to their own garage, the card simply does not exist.
    let err = workshop
        .job_card(&mechanic_b, None, job_card_id)
        .unwrap_err();
    assert_eq!(err.kind(), "not_found");

    // Super admins must name a garage; nothing is implicit.
    let root = super_admin();
    let err = workshop.list_parts(&root, None).unwrap_err();
    assert_eq!(err.kind(), "garage_id_required");
    assert_eq!(workshop.list_parts(&root, Some(garage_a)).unwrap().len(), 1);
    assert!(workshop.list_parts(&root, Some(garage_b)).unwrap().is_empty());
}

#[test]
fn registration_requires_a_valid_activation_code() {
    let workshop = Workshop::new(policy());
    let err = workshop
        .register_garage("WRONG-CODE", profile("Speedy Motors"))
        .unwrap_err();
    assert_eq!(err.kind(), "unauthorized");
}

#[test]
fn part_numbers_are_unique_per_garage() {
    let workshop = Workshop::new(policy());
    let garage_a = workshop
        .register_garage("GK-2026", profile("Speedy Motors"))
        .unwrap();
    let garage_b = workshop
        .register_garage("GK-2026", profile("City Bikes"))
        .unwrap();

    let admin_a = admin(garage_a);
    brake_pads(&workshop, &admin_a, 3);

    // Same number, normalized differently, still collides within the garage.
    let err = workshop
        .add_spare_part(
            &admin_a,
            None,
            NewSparePart {
                part_number: " brk-01 ".to_string(),
                name: "Brake Pads (aftermarket)".to_string(),
                quantity: 10,
                selling_price: Money::from_minor(15000),
                cost_price: Money::from_minor(9000),
                low_stock_threshold: None,
            },
        )
        .unwrap_err();
    assert_eq!(err.kind(), "conflict");

    // Another garage is free to use the same number.
    let admin_b = admin(garage_b);
    brake_pads(&workshop, &admin_b, 5);
}

#[test]
fn repeat_customers_are_upserted_by_identity() {
    let (workshop, _garage_id, identity) = setup();
    let part_id = brake_pads(&workshop, &identity, 10);

    let first = open_brake_job(&workshop, &identity, part_id);
    let second = workshop
        .open_job_card(
            &identity,
            None,
            NewJobCard {
                customer: CustomerDetails {
                    name: " ali raza ".to_string(),
                    phone: "0300-1234567".to_string(),
                    bike_number: "ka-01-x 991".to_string(),
                },
                description: "oil change".to_string(),
                service_charge: ServiceCharge::flat(Money::from_minor(8000)),
                parts: vec![],
            },
        )
        .unwrap();

    let customers = workshop.list_customers(&identity, None).unwrap();
    assert_eq!(customers.len(), 1);

    let first_card = workshop.job_card(&identity, None, first).unwrap();
    let second_card = workshop.job_card(&identity, None, second).unwrap();
    assert_eq!(first_card.customer_id, second_card.customer_id);
}

#[test]
fn staff_directory_resolves_and_suspends_credentials() {
    let (workshop, garage_id, identity) = setup();

    let user_id = workshop
        .register_user(
            &identity,
            None,
            NewUser {
                email: "Mechanic@Example.com".to_string(),
                password_hash: "argon2id$stub".to_string(),
                role: Role::MechanicStaff,
            },
        )
        .unwrap();

    // Emails are globally unique, even across garages.
    let err = workshop
        .register_user(
            &identity,
            None,
            NewUser {
                email: "mechanic@example.com".to_string(),
                password_hash: "argon2id$stub".to_string(),
                role: Role::MechanicStaff,
            },
        )
        .unwrap_err();
    assert_eq!(err.kind(), "conflict");

    let garage_b = workshop
        .register_garage("GK-2026", profile("City Bikes"))
        .unwrap();
    let err = workshop
        .register_user(
            &admin(garage_b),
            None,
            NewUser {
                email: " MECHANIC@example.com ".to_string(),
                password_hash: "argon2id$stub".to_string(),
                role: Role::GarageAdmin,
            },
        )
        .unwrap_err();
    assert_eq!(err.kind(), "conflict");

    // Mechanics cannot manage accounts.
    let staff = workshop.resolve("Mechanic@Example.com").unwrap();
    assert_eq!(staff.role, Role::MechanicStaff);
    assert_eq!(staff.garage_id, Some(garage_id));
    let err = workshop
        .register_user(
            &staff,
            None,
            NewUser {
                email: "other@example.com".to_string(),
                password_hash: "argon2id$stub".to_string(),
                role: Role::MechanicStaff,
            },
        )
        .unwrap_err();
    assert_eq!(err.kind(), "unauthorized");

    // Suspension kills the credential.
    workshop
        .suspend_user(&identity, None, user_id, Some("left the garage".to_string()))
        .unwrap();
    assert!(workshop.resolve("mechanic@example.com").is_err());

    // Super admins come from policy, not the directory.
    let root = workshop.resolve("ops@example.com").unwrap();
    assert_eq!(root.role, Role::SuperAdmin);
    assert_eq!(root.garage_id, None);
    assert!(workshop.resolve("stranger@example.com").is_err());
}

#[test]
fn concurrent_completions_have_one_winner() {
    use std::sync::{Arc, Barrier};
    use std::thread;

    let (workshop, _garage_id, identity) = setup();
    let workshop = Arc::new(workshop);
    let part_id = brake_pads(&workshop, &identity, 100);

    for round in 0..10_i64 {
        let job_card_id = open_brake_job(&workshop, &identity, part_id);
        let barrier = Arc::new(Barrier::new(2));

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let workshop = Arc::clone(&workshop);
                let identity = identity.clone();
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    workshop.complete_job_card(&identity, None, job_card_id)
                })
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1, "round {round}");
        let loser = results
            .into_iter()
            .find(Result::is_err)
            .unwrap()
            .unwrap_err();
        assert_eq!(loser.kind(), "invalid_state_transition", "round {round}");

        // The loser released its reservation: one decrement per round.
        let part = workshop.part(&identity, None, part_id).unwrap();
        assert_eq!(part.quantity, 100 - 2 * (round + 1), "round {round}");
        assert_eq!(
            workshop.list_invoices(&identity, None).unwrap().len() as i64,
            round + 1,
            "round {round}"
        );
    }
}

#[test]
fn completion_withstands_concurrent_customer_edits() {
    use std::sync::Arc;
    use std::thread;

    let (workshop, _garage_id, identity) = setup();
    let workshop = Arc::new(workshop);
    let part_id = brake_pads(&workshop, &identity, 100);

    for round in 0..20_i64 {
        let job_card_id = open_brake_job(&workshop, &identity, part_id);
        let customer_id = workshop.list_customers(&identity, None).unwrap()[0].customer_id;

        let editor = {
            let workshop = Arc::clone(&workshop);
            let identity = identity.clone();
            thread::spawn(move || {
                for i in 0..20 {
                    let _ = workshop.update_customer_profile(
                        &identity,
                        None,
                        customer_id,
                        CustomerPatch {
                            notes: Some(Some(format!("note {i}"))),
                            ..Default::default()
                        },
                    );
                }
            })
        };

        let receipt = workshop
            .complete_job_card(&identity, None, job_card_id)
            .unwrap_or_else(|err| panic!("round {round}: completion failed: {err:?}"));
        editor.join().unwrap();

        // Decremented stock always comes with its invoice.
        let invoice = workshop
            .invoice_for_job_card(&identity, None, job_card_id)
            .unwrap_or_else(|_| panic!("round {round}: stock moved but no invoice exists"));
        assert_eq!(invoice.document_url, receipt.document_url);
    }

    let part = workshop.part(&identity, None, part_id).unwrap();
    assert_eq!(part.quantity, 100 - 2 * 20);
}

#[test]
fn read_models_rebuild_from_the_event_store() {
    let (workshop, _garage_id, identity) = setup();
    let part_id = brake_pads(&workshop, &identity, 3);
    let job_card_id = open_brake_job(&workshop, &identity, part_id);
    workshop
        .complete_job_card(&identity, None, job_card_id)
        .unwrap();

    workshop.rebuild_read_models().unwrap();

    assert_eq!(workshop.part(&identity, None, part_id).unwrap().quantity, 1);
    let card = workshop.job_card(&identity, None, job_card_id).unwrap();
    assert_eq!(card.total_amount, Some(Money::from_minor(55000)));
    assert_eq!(workshop.list_invoices(&identity, None).unwrap().len(), 1);
    let customers = workshop.list_customers(&identity, None).unwrap();
    assert_eq!(customers[0].total_jobs, 1);
}

#[test]
fn completion_emits_notification_events() {
    use garagekit_events::IntegrationEvent;

    let (workshop, garage_id, identity) = setup();
    let feed = workshop.subscribe_notifications();

    let part_id = brake_pads(&workshop, &identity, 3);
    let job_card_id = open_brake_job(&workshop, &identity, part_id);
    let receipt = workshop
        .complete_job_card(&identity, None, job_card_id)
        .unwrap();

    match feed.try_recv().unwrap() {
        IntegrationEvent::JobCardCompleted(e) => {
            assert_eq!(e.garage_id, garage_id);
            assert_eq!(e.job_card_id, job_card_id.0);
            assert_eq!(e.total_amount, Money::from_minor(55000));
        }
        other => panic!("Expected JobCardCompleted first, got {other:?}"),
    }
    match feed.try_recv().unwrap() {
        IntegrationEvent::InvoiceCreated(e) => {
            assert_eq!(e.invoice_id, receipt.invoice_id.0);
            assert_eq!(e.document_url, receipt.document_url);
        }
        other => panic!("Expected InvoiceCreated second, got {other:?}"),
    }
}
