//! The `Workshop` service facade.
//!
//! One struct wires the event store, bus, dispatcher, and read models
//! together and exposes the operations the outer surfaces (HTTP, desktop)
//! call. Every operation takes the caller's [`Identity`] and resolves the
//! garage scope before touching any data; projections are fed synchronously
//! from the published envelopes after each dispatch.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use chrono::Utc;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use tracing::info;

use garagekit_auth::{
    AuthPolicy, Identity, IdentityResolver, RegisterUser, Role, SuspendUser, User, UserAccountId,
    UserCommand, UserEvent,
};
use garagekit_core::{
    Aggregate, AggregateId, DomainError, DomainResult, GarageId, Money, UserId,
};
use garagekit_customers::{
    CreateCustomer, Customer, CustomerCommand, CustomerId, CustomerIdentity, UpdateCustomerProfile,
};
use garagekit_events::{
    EventBus, EventEnvelope, InMemoryEventBus, IntegrationEvent, Subscription,
};
use garagekit_garages::{Garage, GarageCommand, GarageProfile, RegisterGarage, UpdateGarageProfile};
use garagekit_infra::projections::{
    CustomerReadModel, CustomersProjection, InvoiceReadModel, InvoicesProjection,
    InventoryStockProjection, JobCardReadModel, JobCardsProjection, PartReadModel, UserReadModel,
    UsersProjection,
};
use garagekit_infra::{
    CommandDispatcher, InMemoryDocumentStore, InMemoryEventStore, InMemoryGarageStore, StoredEvent,
};
use garagekit_inventory::{
    AddSparePart, AdjustStock, InventoryCommand, SparePart, SparePartId, UpdateSparePart,
};
use garagekit_invoicing::InvoiceId;
use garagekit_jobcards::{
    JobCard, JobCardCommand, JobCardId, OpenJobCard, RequestedPart, ServiceCharge, UpdateJobCard,
};

use crate::errors::{AppError, AppResult};

pub(crate) const GARAGE_AGGREGATE: &str = "garages.garage";
pub(crate) const USER_AGGREGATE: &str = "auth.user";
pub(crate) const CUSTOMER_AGGREGATE: &str = "customers.customer";
pub(crate) const SPARE_PART_AGGREGATE: &str = "inventory.spare_part";
pub(crate) const JOB_CARD_AGGREGATE: &str = "jobcards.job_card";
pub(crate) const INVOICE_AGGREGATE: &str = "invoicing.invoice";

/// The garage aggregate is its own stream: the tenant id doubles as the
/// aggregate id.
pub(crate) fn garage_aggregate_id(garage_id: GarageId) -> AggregateId {
    AggregateId::from(garage_id)
}

pub(crate) fn internal(err: impl core::fmt::Display) -> AppError {
    AppError::Internal(err.to_string())
}

type JsonEnvelope = EventEnvelope<JsonValue>;
type DomainBus = InMemoryEventBus<JsonEnvelope>;
type Dispatcher = CommandDispatcher<Arc<InMemoryEventStore>, Arc<DomainBus>>;

/// New staff account input.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
    pub role: Role,
}

/// Garage profile patch (absent fields keep their current value).
#[derive(Debug, Clone, Default)]
pub struct GaragePatch {
    pub name: Option<String>,
    pub owner_name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    /// `Some(None)` clears the logo.
    pub logo: Option<Option<String>>,
}

/// New customer input.
#[derive(Debug, Clone)]
pub struct NewCustomer {
    pub name: String,
    pub phone: String,
    pub bike_number: String,
    pub notes: Option<String>,
}

/// Customer profile patch.
#[derive(Debug, Clone, Default)]
pub struct CustomerPatch {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub bike_number: Option<String>,
    /// `Some(None)` clears the notes.
    pub notes: Option<Option<String>>,
}

/// New catalogue entry input.
#[derive(Debug, Clone)]
pub struct NewSparePart {
    pub part_number: String,
    pub name: String,
    pub quantity: i64,
    pub selling_price: Money,
    pub cost_price: Money,
    pub low_stock_threshold: Option<i64>,
}

/// Catalogue patch; quantity is deliberately absent (use `adjust_stock`).
#[derive(Debug, Clone, Default)]
pub struct SparePartPatch {
    pub name: Option<String>,
    pub selling_price: Option<Money>,
    pub cost_price: Option<Money>,
    pub low_stock_threshold: Option<i64>,
}

/// Who the job is for, as written on the intake form. Resolved to an existing
/// customer by normalized identity, or a new one is created.
#[derive(Debug, Clone)]
pub struct CustomerDetails {
    pub name: String,
    pub phone: String,
    pub bike_number: String,
}

/// A requested part reference; the catalogue supplies number and name.
#[derive(Debug, Clone, Copy)]
pub struct PartRequest {
    pub part_id: SparePartId,
    pub quantity: i64,
}

/// Job card intake input.
#[derive(Debug, Clone)]
pub struct NewJobCard {
    pub customer: CustomerDetails,
    pub description: String,
    pub service_charge: ServiceCharge,
    pub parts: Vec<PartRequest>,
}

/// Job card patch (pending cards only).
#[derive(Debug, Clone, Default)]
pub struct JobCardPatch {
    pub description: Option<String>,
    pub service_charge: Option<ServiceCharge>,
    pub parts: Option<Vec<PartRequest>>,
}

/// Application service wired over in-memory infrastructure.
///
/// Persistence and transport are behind the `EventStore` / `EventBus` /
/// `DocumentStore` traits; this facade picks the in-memory implementations,
/// which is what the desktop deployment and the test suite run on.
pub struct Workshop {
    pub(crate) policy: AuthPolicy,
    pub(crate) store: Arc<InMemoryEventStore>,
    pub(crate) dispatcher: Dispatcher,
    pub(crate) documents: Arc<InMemoryDocumentStore>,
    pub(crate) notifications: Arc<InMemoryEventBus<IntegrationEvent>>,
    pub(crate) customers: CustomersProjection<Arc<InMemoryGarageStore<CustomerId, CustomerReadModel>>>,
    pub(crate) inventory: InventoryStockProjection<Arc<InMemoryGarageStore<SparePartId, PartReadModel>>>,
    pub(crate) job_cards: JobCardsProjection<Arc<InMemoryGarageStore<JobCardId, JobCardReadModel>>>,
    pub(crate) invoices: InvoicesProjection<Arc<InMemoryGarageStore<InvoiceId, InvoiceReadModel>>>,
    pub(crate) users: UsersProjection<Arc<InMemoryGarageStore<UserAccountId, UserReadModel>>>,
    /// Cross-garage email index: staff emails are globally unique and the
    /// sign-in credential carries no garage.
    email_directory: RwLock<HashMap<String, (GarageId, UserAccountId)>>,
    feed: Mutex<Subscription<JsonEnvelope>>,
}

impl Workshop {
    pub fn new(policy: AuthPolicy) -> Self {
        let store = Arc::new(InMemoryEventStore::new());
        let bus: Arc<DomainBus> = Arc::new(InMemoryEventBus::new());
        let feed = Mutex::new(bus.subscribe());
        let dispatcher = CommandDispatcher::new(Arc::clone(&store), bus);

        Self {
            policy,
            store,
            dispatcher,
            documents: Arc::new(InMemoryDocumentStore::new()),
            notifications: Arc::new(InMemoryEventBus::new()),
            customers: CustomersProjection::new(Arc::new(InMemoryGarageStore::new())),
            inventory: InventoryStockProjection::new(Arc::new(InMemoryGarageStore::new())),
            job_cards: JobCardsProjection::new(Arc::new(InMemoryGarageStore::new())),
            invoices: InvoicesProjection::new(Arc::new(InMemoryGarageStore::new())),
            users: UsersProjection::new(Arc::new(InMemoryGarageStore::new())),
            email_directory: RwLock::new(HashMap::new()),
            feed,
        }
    }

    /// Subscribe to the outbound notification feed (completed jobs, invoices).
    pub fn subscribe_notifications(&self) -> Subscription<IntegrationEvent> {
        self.notifications.subscribe()
    }

    /// Dispatch a command and feed the read models from what got committed.
    pub(crate) fn run<A>(
        &self,
        garage_id: GarageId,
        aggregate_id: AggregateId,
        aggregate_type: &'static str,
        command: A::Command,
        make_aggregate: impl FnOnce(GarageId, AggregateId) -> A,
    ) -> AppResult<Vec<StoredEvent>>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: garagekit_events::Event + Serialize + DeserializeOwned,
    {
        let committed =
            self.dispatcher
                .dispatch::<A>(garage_id, aggregate_id, aggregate_type, command, make_aggregate)?;
        self.pump()?;
        Ok(committed)
    }

    /// Drain the envelope feed into every projection.
    pub(crate) fn pump(&self) -> AppResult<()> {
        let feed = self
            .feed
            .lock()
            .map_err(|_| AppError::Internal("envelope feed lock poisoned".to_string()))?;
        while let Ok(envelope) = feed.try_recv() {
            self.apply_to_projections(&envelope)?;
        }
        Ok(())
    }

    fn apply_to_projections(&self, envelope: &JsonEnvelope) -> AppResult<()> {
        self.inventory.apply_envelope(envelope).map_err(internal)?;
        self.customers.apply_envelope(envelope).map_err(internal)?;
        self.job_cards.apply_envelope(envelope).map_err(internal)?;
        self.invoices.apply_envelope(envelope).map_err(internal)?;
        self.users.apply_envelope(envelope).map_err(internal)?;
        self.index_staff_email(envelope)?;
        Ok(())
    }

    fn index_staff_email(&self, envelope: &JsonEnvelope) -> AppResult<()> {
        if envelope.aggregate_type() != USER_AGGREGATE {
            return Ok(());
        }
        let event: UserEvent =
            serde_json::from_value(envelope.payload().clone()).map_err(internal)?;
        if let UserEvent::UserRegistered(e) = event {
            let mut directory = self
                .email_directory
                .write()
                .map_err(|_| AppError::Internal("email directory lock poisoned".to_string()))?;
            directory.insert(e.email, (e.garage_id, e.user_id));
        }
        Ok(())
    }

    /// Rebuild every read model from the event store.
    pub fn rebuild_read_models(&self) -> AppResult<()> {
        let envelopes: Vec<JsonEnvelope> = self
            .store
            .all_events()
            .iter()
            .map(StoredEvent::to_envelope)
            .collect();

        self.inventory
            .rebuild_from_scratch(envelopes.clone())
            .map_err(internal)?;
        self.customers
            .rebuild_from_scratch(envelopes.clone())
            .map_err(internal)?;
        self.job_cards
            .rebuild_from_scratch(envelopes.clone())
            .map_err(internal)?;
        if let Ok(mut directory) = self.email_directory.write() {
            directory.clear();
        }
        for envelope in &envelopes {
            self.invoices.apply_envelope(envelope).map_err(internal)?;
            self.users.apply_envelope(envelope).map_err(internal)?;
            self.index_staff_email(envelope)?;
        }
        Ok(())
    }

    fn require_admin(identity: &Identity) -> AppResult<()> {
        match identity.role {
            Role::GarageAdmin | Role::SuperAdmin => Ok(()),
            Role::MechanicStaff => Err(AppError::Unauthorized),
        }
    }
}

// ---------------------------------------------------------------------------
// Garages
// ---------------------------------------------------------------------------

impl Workshop {
    /// Register a new garage. Open to anyone holding a valid activation code.
    pub fn register_garage(
        &self,
        activation_code: &str,
        profile: GarageProfile,
    ) -> AppResult<GarageId> {
        if !self.policy.is_valid_activation_code(activation_code) {
            return Err(AppError::Unauthorized);
        }

        let garage_id = GarageId::new();
        self.run::<Garage>(
            garage_id,
            garage_aggregate_id(garage_id),
            GARAGE_AGGREGATE,
            GarageCommand::RegisterGarage(RegisterGarage {
                garage_id,
                profile,
                occurred_at: Utc::now(),
            }),
            |_, _| Garage::empty(garage_id),
        )?;
        info!(%garage_id, "garage registered");
        Ok(garage_id)
    }

    pub fn garage_profile(
        &self,
        identity: &Identity,
        garage: Option<GarageId>,
    ) -> AppResult<GarageProfile> {
        let garage_id = identity.garage_scope(garage)?;
        let aggregate = self.load_garage(garage_id)?;
        Ok(aggregate.profile().clone())
    }

    pub fn update_garage_profile(
        &self,
        identity: &Identity,
        garage: Option<GarageId>,
        patch: GaragePatch,
    ) -> AppResult<()> {
        Self::require_admin(identity)?;
        let garage_id = identity.garage_scope(garage)?;

        self.run::<Garage>(
            garage_id,
            garage_aggregate_id(garage_id),
            GARAGE_AGGREGATE,
            GarageCommand::UpdateGarageProfile(UpdateGarageProfile {
                garage_id,
                name: patch.name,
                owner_name: patch.owner_name,
                phone: patch.phone,
                email: patch.email,
                logo: patch.logo,
                occurred_at: Utc::now(),
            }),
            |_, _| Garage::empty(garage_id),
        )?;
        Ok(())
    }

    pub(crate) fn load_garage(&self, garage_id: GarageId) -> AppResult<Garage> {
        let aggregate = self.dispatcher.load(
            garage_id,
            garage_aggregate_id(garage_id),
            |_, _| Garage::empty(garage_id),
        )?;
        if !aggregate.is_registered() {
            return Err(AppError::NotFound);
        }
        Ok(aggregate)
    }
}

// ---------------------------------------------------------------------------
// Staff accounts
// ---------------------------------------------------------------------------

impl Workshop {
    /// Register a staff account. Admin-only; emails are globally unique so
    /// the sign-in credential does not need to carry a garage.
    pub fn register_user(
        &self,
        identity: &Identity,
        garage: Option<GarageId>,
        new_user: NewUser,
    ) -> AppResult<UserAccountId> {
        Self::require_admin(identity)?;
        let garage_id = identity.garage_scope(garage)?;

        let email_key = new_user.email.trim().to_lowercase();
        let taken = self
            .email_directory
            .read()
            .map_err(|_| AppError::Internal("email directory lock poisoned".to_string()))?
            .contains_key(&email_key);
        if taken || self.policy.is_super_admin_email(&email_key) {
            return Err(AppError::Conflict("email already registered".to_string()));
        }

        let user_id = UserAccountId::new(AggregateId::new());
        self.run::<User>(
            garage_id,
            user_id.0,
            USER_AGGREGATE,
            UserCommand::RegisterUser(RegisterUser {
                garage_id,
                user_id,
                email: new_user.email,
                password_hash: new_user.password_hash,
                role: new_user.role,
                occurred_at: Utc::now(),
            }),
            |_, _| User::empty(user_id),
        )?;
        Ok(user_id)
    }

    pub fn suspend_user(
        &self,
        identity: &Identity,
        garage: Option<GarageId>,
        user_id: UserAccountId,
        reason: Option<String>,
    ) -> AppResult<()> {
        Self::require_admin(identity)?;
        let garage_id = identity.garage_scope(garage)?;

        self.run::<User>(
            garage_id,
            user_id.0,
            USER_AGGREGATE,
            UserCommand::SuspendUser(SuspendUser {
                garage_id,
                user_id,
                reason,
                occurred_at: Utc::now(),
            }),
            |_, _| User::empty(user_id),
        )?;
        Ok(())
    }

    pub fn list_users(
        &self,
        identity: &Identity,
        garage: Option<GarageId>,
    ) -> AppResult<Vec<UserReadModel>> {
        Self::require_admin(identity)?;
        let garage_id = identity.garage_scope(garage)?;
        Ok(self.users.list(garage_id))
    }
}

/// Credentials (emails, here) resolve against policy first, then the
/// cross-garage staff directory. Unknown and suspended accounts both come
/// back `Unauthorized`, without distinguishing why.
impl IdentityResolver for Workshop {
    fn resolve(&self, credential: &str) -> DomainResult<Identity> {
        let email = credential.trim().to_lowercase();

        if self.policy.is_super_admin_email(&email) {
            return Ok(Identity {
                user_id: UserId::new(),
                garage_id: None,
                role: Role::SuperAdmin,
            });
        }

        let (garage_id, user_id) = *self
            .email_directory
            .read()
            .map_err(|_| DomainError::Unauthorized)?
            .get(&email)
            .ok_or(DomainError::Unauthorized)?;
        let account = self
            .users
            .get(garage_id, &user_id)
            .ok_or(DomainError::Unauthorized)?;
        if !account.can_sign_in() {
            return Err(DomainError::Unauthorized);
        }
        Ok(Identity {
            user_id: UserId::from_uuid(*account.user_id.0.as_uuid()),
            garage_id: Some(account.garage_id),
            role: account.role,
        })
    }
}

// ---------------------------------------------------------------------------
// Customers
// ---------------------------------------------------------------------------

impl Workshop {
    pub fn create_customer(
        &self,
        identity: &Identity,
        garage: Option<GarageId>,
        new_customer: NewCustomer,
    ) -> AppResult<CustomerId> {
        let garage_id = identity.garage_scope(garage)?;
        let customer_id = CustomerId::new(AggregateId::new());

        self.run::<Customer>(
            garage_id,
            customer_id.0,
            CUSTOMER_AGGREGATE,
            CustomerCommand::CreateCustomer(CreateCustomer {
                garage_id,
                customer_id,
                name: new_customer.name,
                phone: new_customer.phone,
                bike_number: new_customer.bike_number,
                notes: new_customer.notes,
                occurred_at: Utc::now(),
            }),
            |_, _| Customer::empty(customer_id),
        )?;
        Ok(customer_id)
    }

    pub fn update_customer_profile(
        &self,
        identity: &Identity,
        garage: Option<GarageId>,
        customer_id: CustomerId,
        patch: CustomerPatch,
    ) -> AppResult<()> {
        let garage_id = identity.garage_scope(garage)?;

        self.run::<Customer>(
            garage_id,
            customer_id.0,
            CUSTOMER_AGGREGATE,
            CustomerCommand::UpdateCustomerProfile(UpdateCustomerProfile {
                garage_id,
                customer_id,
                name: patch.name,
                phone: patch.phone,
                bike_number: patch.bike_number,
                notes: patch.notes,
                occurred_at: Utc::now(),
            }),
            |_, _| Customer::empty(customer_id),
        )?;
        Ok(())
    }

    pub fn customer(
        &self,
        identity: &Identity,
        garage: Option<GarageId>,
        customer_id: CustomerId,
    ) -> AppResult<CustomerReadModel> {
        let garage_id = identity.garage_scope(garage)?;
        self.customers
            .get(garage_id, &customer_id)
            .ok_or(AppError::NotFound)
    }

    pub fn list_customers(
        &self,
        identity: &Identity,
        garage: Option<GarageId>,
    ) -> AppResult<Vec<CustomerReadModel>> {
        let garage_id = identity.garage_scope(garage)?;
        Ok(self.customers.list(garage_id))
    }

    /// Find or create the customer matching the intake details.
    pub(crate) fn upsert_customer(
        &self,
        garage_id: GarageId,
        details: &CustomerDetails,
    ) -> AppResult<CustomerId> {
        let wanted = CustomerIdentity::new(&details.name, &details.phone, &details.bike_number);
        if let Some(existing) = self.customers.get_by_identity(garage_id, &wanted) {
            return Ok(existing.customer_id);
        }

        let customer_id = CustomerId::new(AggregateId::new());
        self.run::<Customer>(
            garage_id,
            customer_id.0,
            CUSTOMER_AGGREGATE,
            CustomerCommand::CreateCustomer(CreateCustomer {
                garage_id,
                customer_id,
                name: details.name.clone(),
                phone: details.phone.clone(),
                bike_number: details.bike_number.clone(),
                notes: None,
                occurred_at: Utc::now(),
            }),
            |_, _| Customer::empty(customer_id),
        )?;
        Ok(customer_id)
    }
}

// ---------------------------------------------------------------------------
// Inventory
// ---------------------------------------------------------------------------

impl Workshop {
    /// Add a catalogue entry. Part numbers are unique per garage
    /// (case-insensitive).
    pub fn add_spare_part(
        &self,
        identity: &Identity,
        garage: Option<GarageId>,
        part: NewSparePart,
    ) -> AppResult<SparePartId> {
        let garage_id = identity.garage_scope(garage)?;

        if self
            .inventory
            .get_by_part_number(garage_id, &part.part_number)
            .is_some()
        {
            return Err(AppError::Conflict("part number already in use".to_string()));
        }

        let part_id = SparePartId::new(AggregateId::new());
        self.run::<SparePart>(
            garage_id,
            part_id.0,
            SPARE_PART_AGGREGATE,
            InventoryCommand::AddSparePart(AddSparePart {
                garage_id,
                part_id,
                part_number: part.part_number,
                name: part.name,
                quantity: part.quantity,
                selling_price: part.selling_price,
                cost_price: part.cost_price,
                low_stock_threshold: part.low_stock_threshold,
                occurred_at: Utc::now(),
            }),
            |_, _| SparePart::empty(part_id),
        )?;
        Ok(part_id)
    }

    pub fn update_spare_part(
        &self,
        identity: &Identity,
        garage: Option<GarageId>,
        part_id: SparePartId,
        patch: SparePartPatch,
    ) -> AppResult<()> {
        let garage_id = identity.garage_scope(garage)?;

        self.run::<SparePart>(
            garage_id,
            part_id.0,
            SPARE_PART_AGGREGATE,
            InventoryCommand::UpdateSparePart(UpdateSparePart {
                garage_id,
                part_id,
                name: patch.name,
                selling_price: patch.selling_price,
                cost_price: patch.cost_price,
                low_stock_threshold: patch.low_stock_threshold,
                occurred_at: Utc::now(),
            }),
            |_, _| SparePart::empty(part_id),
        )?;
        Ok(())
    }

    /// Manual stock correction (positive or negative delta).
    pub fn adjust_stock(
        &self,
        identity: &Identity,
        garage: Option<GarageId>,
        part_id: SparePartId,
        delta: i64,
    ) -> AppResult<()> {
        let garage_id = identity.garage_scope(garage)?;

        self.run::<SparePart>(
            garage_id,
            part_id.0,
            SPARE_PART_AGGREGATE,
            InventoryCommand::AdjustStock(AdjustStock {
                garage_id,
                part_id,
                delta,
                occurred_at: Utc::now(),
            }),
            |_, _| SparePart::empty(part_id),
        )?;
        Ok(())
    }

    pub fn part(
        &self,
        identity: &Identity,
        garage: Option<GarageId>,
        part_id: SparePartId,
    ) -> AppResult<PartReadModel> {
        let garage_id = identity.garage_scope(garage)?;
        self.inventory
            .get(garage_id, &part_id)
            .ok_or(AppError::NotFound)
    }

    pub fn list_parts(
        &self,
        identity: &Identity,
        garage: Option<GarageId>,
    ) -> AppResult<Vec<PartReadModel>> {
        let garage_id = identity.garage_scope(garage)?;
        Ok(self.inventory.list(garage_id))
    }

    pub fn low_stock(
        &self,
        identity: &Identity,
        garage: Option<GarageId>,
        threshold_override: Option<i64>,
    ) -> AppResult<Vec<PartReadModel>> {
        let garage_id = identity.garage_scope(garage)?;
        Ok(self.inventory.low_stock(garage_id, threshold_override))
    }
}

// ---------------------------------------------------------------------------
// Job cards
// ---------------------------------------------------------------------------

impl Workshop {
    /// Open a job card. The customer is resolved by identity (found or
    /// created); parts are referenced from the catalogue without any price.
    pub fn open_job_card(
        &self,
        identity: &Identity,
        garage: Option<GarageId>,
        intake: NewJobCard,
    ) -> AppResult<JobCardId> {
        let garage_id = identity.garage_scope(garage)?;
        let requested_parts = self.resolve_part_requests(garage_id, &intake.parts)?;
        let customer_id = self.upsert_customer(garage_id, &intake.customer)?;

        let job_card_id = JobCardId::new(AggregateId::new());
        self.run::<JobCard>(
            garage_id,
            job_card_id.0,
            JOB_CARD_AGGREGATE,
            JobCardCommand::OpenJobCard(OpenJobCard {
                garage_id,
                job_card_id,
                customer_id,
                description: intake.description,
                service_charge: intake.service_charge,
                requested_parts,
                occurred_at: Utc::now(),
            }),
            |_, _| JobCard::empty(job_card_id),
        )?;
        info!(%garage_id, %job_card_id, "job card opened");
        Ok(job_card_id)
    }

    /// Edit a pending job card; completed cards reject this downstream.
    pub fn update_job_card(
        &self,
        identity: &Identity,
        garage: Option<GarageId>,
        job_card_id: JobCardId,
        patch: JobCardPatch,
    ) -> AppResult<()> {
        let garage_id = identity.garage_scope(garage)?;
        let requested_parts = match patch.parts {
            Some(parts) => Some(self.resolve_part_requests(garage_id, &parts)?),
            None => None,
        };

        self.run::<JobCard>(
            garage_id,
            job_card_id.0,
            JOB_CARD_AGGREGATE,
            JobCardCommand::UpdateJobCard(UpdateJobCard {
                garage_id,
                job_card_id,
                description: patch.description,
                service_charge: patch.service_charge,
                requested_parts,
                occurred_at: Utc::now(),
            }),
            |_, _| JobCard::empty(job_card_id),
        )?;
        Ok(())
    }

    /// Live-price estimate for a pending job card.
    pub fn estimate_job_card(
        &self,
        identity: &Identity,
        garage: Option<GarageId>,
        job_card_id: JobCardId,
    ) -> AppResult<Money> {
        let garage_id = identity.garage_scope(garage)?;
        let card = self
            .dispatcher
            .load(garage_id, job_card_id.0, |_, _| JobCard::empty(job_card_id))?;

        let estimate = card.estimate(|part_id| {
            self.inventory
                .get(garage_id, &part_id)
                .map(|rm| rm.selling_price)
        })?;
        Ok(estimate)
    }

    pub fn job_card(
        &self,
        identity: &Identity,
        garage: Option<GarageId>,
        job_card_id: JobCardId,
    ) -> AppResult<JobCardReadModel> {
        let garage_id = identity.garage_scope(garage)?;
        self.job_cards
            .get(garage_id, &job_card_id)
            .ok_or(AppError::NotFound)
    }

    pub fn list_pending_job_cards(
        &self,
        identity: &Identity,
        garage: Option<GarageId>,
    ) -> AppResult<Vec<JobCardReadModel>> {
        let garage_id = identity.garage_scope(garage)?;
        Ok(self.job_cards.list_pending(garage_id))
    }

    fn resolve_part_requests(
        &self,
        garage_id: GarageId,
        requests: &[PartRequest],
    ) -> AppResult<Vec<RequestedPart>> {
        requests
            .iter()
            .map(|req| {
                let rm = self
                    .inventory
                    .get(garage_id, &req.part_id)
                    .ok_or(AppError::NotFound)?;
                Ok(RequestedPart {
                    part_id: req.part_id,
                    part_number: rm.part_number,
                    name: rm.name,
                    quantity: req.quantity,
                })
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Invoices
// ---------------------------------------------------------------------------

impl Workshop {
    pub fn invoice(
        &self,
        identity: &Identity,
        garage: Option<GarageId>,
        invoice_id: InvoiceId,
    ) -> AppResult<InvoiceReadModel> {
        let garage_id = identity.garage_scope(garage)?;
        self.invoices
            .get(garage_id, &invoice_id)
            .ok_or(AppError::NotFound)
    }

    pub fn list_invoices(
        &self,
        identity: &Identity,
        garage: Option<GarageId>,
    ) -> AppResult<Vec<InvoiceReadModel>> {
        let garage_id = identity.garage_scope(garage)?;
        Ok(self.invoices.list(garage_id))
    }

    pub fn invoice_for_job_card(
        &self,
        identity: &Identity,
        garage: Option<GarageId>,
        job_card_id: JobCardId,
    ) -> AppResult<InvoiceReadModel> {
        let garage_id = identity.garage_scope(garage)?;
        self.invoices
            .get_by_job_card(garage_id, &job_card_id)
            .ok_or(AppError::NotFound)
    }

    pub fn list_invoices_for_customer(
        &self,
        identity: &Identity,
        garage: Option<GarageId>,
        customer_id: CustomerId,
    ) -> AppResult<Vec<InvoiceReadModel>> {
        let garage_id = identity.garage_scope(garage)?;
        Ok(self.invoices.list_for_customer(garage_id, &customer_id))
    }

    /// Fetch the rendered document bytes for a stored invoice.
    pub fn invoice_document(
        &self,
        identity: &Identity,
        garage: Option<GarageId>,
        invoice_id: InvoiceId,
    ) -> AppResult<Vec<u8>> {
        use garagekit_infra::DocumentStore;

        let garage_id = identity.garage_scope(garage)?;
        let invoice = self
            .invoices
            .get(garage_id, &invoice_id)
            .ok_or(AppError::NotFound)?;
        self.documents
            .get(garage_id, &invoice.document_url)
            .ok_or(AppError::NotFound)
    }
}
