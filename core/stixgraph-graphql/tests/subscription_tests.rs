use async_graphql::Request;
use futures::StreamExt;
use futures::stream::BoxStream;
use pretty_assertions::assert_eq;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use stixgraph_domain::{Backends, EditContextStore, InMemoryEditContexts, StixDomainEntityService};
use stixgraph_graphql::{StixSchema, build_schema};
use stixgraph_model::{Capability, EditContext, EditInput, EntityAddInput, User};
use stixgraph_types::{EntityId, EntityType, UserId};

#[derive(Default)]
struct CountingContexts {
    inner: InMemoryEditContexts,
    claims: AtomicUsize,
    released: Mutex<Vec<(EntityId, UserId)>>,
}

impl EditContextStore for CountingContexts {
    fn set(&self, context: EditContext) {
        self.inner.set(context);
    }

    fn clear(&self, entity_id: EntityId, user_id: UserId) -> bool {
        self.inner.clear(entity_id, user_id)
    }

    fn claim(&self, context: EditContext) {
        self.claims.fetch_add(1, Ordering::SeqCst);
        self.inner.claim(context);
    }

    fn release(&self, entity_id: EntityId, user_id: UserId) -> bool {
        self.released.lock().unwrap().push((entity_id, user_id));
        self.inner.release(entity_id, user_id)
    }

    fn list(&self, entity_id: EntityId) -> Vec<EditContext> {
        self.inner.list(entity_id)
    }
}

struct Fixture {
    schema: StixSchema,
    service: StixDomainEntityService,
    contexts: Arc<CountingContexts>,
    alice: User,
    bob: User,
}

fn fixture() -> Fixture {
    let contexts = Arc::new(CountingContexts::default());
    let backends = Backends::in_memory()
        .unwrap()
        .with_contexts(contexts.clone());
    let service = StixDomainEntityService::new(backends);
    let admin = |name: &str| {
        User::new(name, format!("{name}@example.com")).with_capabilities([Capability::Admin])
    };
    Fixture {
        schema: build_schema(service.clone()),
        service,
        contexts,
        alice: admin("alice"),
        bob: admin("bob"),
    }
}

fn subscribe(f: &Fixture, user: &User, id: EntityId) -> BoxStream<'static, async_graphql::Response> {
    let query = format!(r#"subscription {{ stixDomainEntity(id: "{id}") {{ id name }} }}"#);
    f.schema.execute_stream(Request::new(query).data(user.clone()))
}

/// Polls the stream long enough for the resolver to run, expecting no item.
async fn settle(stream: &mut BoxStream<'static, async_graphql::Response>) {
    let polled = tokio::time::timeout(Duration::from_millis(50), stream.next()).await;
    assert!(polled.is_err(), "unexpected item: {polled:?}");
}

fn rename(f: &Fixture, user: &User, id: EntityId, name: &str) {
    f.service
        .edit_field(user, id, &EditInput::new("name", vec![name.to_string()]))
        .unwrap();
}

#[tokio::test]
async fn delivers_other_users_edits_of_the_entity_only() {
    let f = fixture();
    let watched = f
        .service
        .add(&f.alice, EntityAddInput::new(EntityType::Malware, "Emotet"))
        .unwrap();
    let other = f
        .service
        .add(&f.alice, EntityAddInput::new(EntityType::Malware, "TrickBot"))
        .unwrap();

    let mut stream = subscribe(&f, &f.alice, watched.id);
    settle(&mut stream).await;
    assert_eq!(f.service.edit_contexts(watched.id)[0].user_id, f.alice.id);

    rename(&f, &f.alice, watched.id, "own edit");
    rename(&f, &f.bob, other.id, "other entity");
    rename(&f, &f.bob, watched.id, "Emotet v2");

    let response = stream.next().await.unwrap();
    assert!(response.errors.is_empty());
    let data = response.data.into_json().unwrap();
    assert_eq!(data["stixDomainEntity"]["name"], "Emotet v2");
    assert_eq!(data["stixDomainEntity"]["id"], watched.id.to_string());
    settle(&mut stream).await;

    drop(stream);
    assert!(f.service.edit_contexts(watched.id).is_empty());
}

#[tokio::test]
async fn every_subscription_cleans_its_context_once() {
    let f = fixture();
    let entity = f
        .service
        .add(&f.alice, EntityAddInput::new(EntityType::Report, "weekly"))
        .unwrap();

    for _ in 0..3 {
        let mut stream = subscribe(&f, &f.bob, entity.id);
        settle(&mut stream).await;
        assert_eq!(f.service.edit_contexts(entity.id).len(), 1);
        drop(stream);
    }

    assert_eq!(f.contexts.claims.load(Ordering::SeqCst), 3);
    let released = f.contexts.released.lock().unwrap().clone();
    assert_eq!(released, vec![(entity.id, f.bob.id); 3]);
}

#[tokio::test]
async fn closing_one_of_two_tabs_keeps_the_context() {
    let f = fixture();
    let entity = f
        .service
        .add(&f.alice, EntityAddInput::new(EntityType::Report, "daily"))
        .unwrap();

    let mut first_tab = subscribe(&f, &f.bob, entity.id);
    settle(&mut first_tab).await;
    let mut second_tab = subscribe(&f, &f.bob, entity.id);
    settle(&mut second_tab).await;

    drop(first_tab);
    let contexts = f.service.edit_contexts(entity.id);
    assert_eq!(contexts.len(), 1);
    assert_eq!(contexts[0].user_id, f.bob.id);

    drop(second_tab);
    assert!(f.service.edit_contexts(entity.id).is_empty());
}

#[tokio::test]
async fn disconnect_ends_the_stream_and_releases() {
    let f = fixture();
    let entity = f
        .service
        .add(&f.alice, EntityAddInput::new(EntityType::Tool, "Mimikatz"))
        .unwrap();

    let mut stream = subscribe(&f, &f.alice, entity.id);
    settle(&mut stream).await;

    f.service
        .backends()
        .bus
        .disconnect(f.service.family().edit_topic())
        .unwrap();
    assert!(stream.next().await.is_none());
    assert_eq!(
        *f.contexts.released.lock().unwrap(),
        vec![(entity.id, f.alice.id)]
    );
    drop(stream);
    assert_eq!(f.contexts.released.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn subscribing_to_a_bad_id_fails_without_a_claim() {
    let f = fixture();
    let mut stream = f.schema.execute_stream(
        Request::new(r#"subscription { stixDomainEntity(id: "nope") { id } }"#)
            .data(f.alice.clone()),
    );
    let response = stream.next().await.unwrap();
    assert_eq!(response.errors.len(), 1);
    assert_eq!(f.contexts.claims.load(Ordering::SeqCst), 0);
}
