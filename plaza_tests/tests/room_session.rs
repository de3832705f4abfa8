//! Socket-level tests: real room server, real room clients, headless scenes.

use std::time::Duration;

use anyhow::Context;

use plaza_client::{
    input::PointerEvent,
    media::{HeadlessSurface, MediaBridge, MediaState, NullMediaTransport, TokenProvider},
    room::{RoomConnection, RoomEvent},
    session::SessionPhase,
    Game, RoomClient,
};
use plaza_shared::{
    config::ClientConfig,
    math::Vec3,
    net::{SessionId, CLOSE_ABNORMAL, CLOSE_CONSENTED},
    render::HeadlessScene,
};
use plaza_tests::{init_tracing, spawn_server, wait_until};

type TestGame = Game<HeadlessScene, RoomClient>;

async fn join(cfg: &ClientConfig, name: &str) -> anyhow::Result<TestGame> {
    let mut cfg = cfg.clone();
    cfg.player_name = name.to_string();
    let room = RoomClient::join(&cfg).await?;
    let mut game = Game::new(HeadlessScene::new(), room, &cfg)?;
    game.bootstrap();
    Ok(game)
}

fn local_id(game: &TestGame) -> SessionId {
    game.room().session_id().clone()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn players_see_each_other_and_moves_replicate() -> anyhow::Result<()> {
    init_tracing();
    let (server, cfg) = spawn_server().await?;

    let mut a = join(&cfg, "alice").await?;
    let mut b = join(&cfg, "bob").await?;
    let a_id = local_id(&a);

    assert!(
        wait_until(|| {
            a.frame();
            b.frame();
            a.registry().len() == 2 && b.registry().len() == 2
        })
        .await,
        "both clients should track both players"
    );
    assert!(a.registry().avatar(&a_id).unwrap().highlighted);
    assert!(!b.registry().avatar(&a_id).unwrap().highlighted);

    let cmd = a
        .on_pointer_down(&PointerEvent::primary(Some(Vec3::new(300.0, 12.0, 10.0))))?
        .expect("primary click on a point must move");
    let expected = Vec3::new(245.0, -1.0, 10.0);
    assert_eq!(cmd.payload, expected);
    // Predicted before any echo.
    assert_eq!(a.registry().target(&a_id), Some(expected));

    assert!(
        wait_until(|| {
            a.frame();
            b.frame();
            b.registry().target(&a_id) == Some(expected)
        })
        .await,
        "bob should receive alice's move"
    );

    // Bob's copy of alice moves towards the target without reaching it at once.
    let before = b.registry().avatar(&a_id).unwrap().position;
    b.frame();
    let after = b.registry().avatar(&a_id).unwrap().position;
    assert!(after.distance(expected) < before.distance(expected));

    server.abort();
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn back_button_returns_to_menu_and_others_drop_the_avatar() -> anyhow::Result<()> {
    init_tracing();
    let (server, cfg) = spawn_server().await?;

    let mut a = join(&cfg, "alice").await?;
    let mut b = join(&cfg, "bob").await?;
    let a_id = local_id(&a);
    assert!(
        wait_until(|| {
            a.frame();
            b.frame();
            b.registry().contains(&a_id)
        })
        .await
    );

    a.press_back()?;

    assert!(
        wait_until(|| {
            a.frame();
            b.frame();
            a.phase() == SessionPhase::AtMenu && !b.registry().contains(&a_id)
        })
        .await,
        "alice should be at the menu and gone for bob"
    );
    assert_eq!(a.menu().unwrap().leave_code, CLOSE_CONSENTED);
    assert!(a.scene().disposed);
    assert!(a.registry().is_empty());
    assert_eq!(b.registry().len(), 1);
    assert_eq!(b.registry().target_count(), 1);

    let frames = a.scene().frames_rendered;
    assert!(!a.frame());
    assert_eq!(a.scene().frames_rendered, frames);

    server.abort();
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn dropped_client_is_removed_for_everyone_else() -> anyhow::Result<()> {
    init_tracing();
    let (server, cfg) = spawn_server().await?;

    let mut a = join(&cfg, "alice").await?;
    let b = join(&cfg, "bob").await?;
    let b_id = local_id(&b);
    assert!(wait_until(|| {
        a.frame();
        a.registry().contains(&b_id)
    })
    .await);

    drop(b);

    assert!(
        wait_until(|| {
            a.frame();
            !a.registry().contains(&b_id)
        })
        .await,
        "bob's avatar should be released"
    );
    assert_eq!(a.scene().mesh_count(), 1);

    server.abort();
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn server_loss_is_reported_as_a_leave() -> anyhow::Result<()> {
    init_tracing();
    let (server, cfg) = spawn_server().await?;
    let mut room = RoomClient::join(&cfg).await?;

    server.abort();
    let _ = server.await;

    let mut left = None;
    assert!(
        wait_until(|| {
            while let Some(event) = room.poll_event() {
                if let RoomEvent::Left { code } = event {
                    left = Some(code);
                }
            }
            left.is_some()
        })
        .await
    );
    assert_eq!(left, Some(CLOSE_ABNORMAL));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn media_grant_is_scoped_to_the_session() -> anyhow::Result<()> {
    init_tracing();
    let (server, cfg) = spawn_server().await?;
    let room = RoomClient::join(&cfg).await?;

    let grant = room.grant_requester().fetch_grant().await?;
    assert_eq!(grant.identity, room.session_id().as_str());
    assert_eq!(grant.room, "my_room-media");
    assert!(!grant.is_expired_at(chrono_now()));

    let other = room.grant_requester().fetch_grant().await?;
    assert_ne!(grant.token, other.token);

    let mut media = MediaBridge::new(
        NullMediaTransport::default(),
        HeadlessSurface::new(),
        cfg.media.url.clone(),
    );
    media.connect(&room.grant_requester()).await?;
    assert_eq!(media.state(), MediaState::Connected);

    server.abort();
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn joining_an_unknown_room_is_rejected() -> anyhow::Result<()> {
    init_tracing();
    let (server, mut cfg) = spawn_server().await?;
    cfg.room_name = "nowhere".into();

    let err = match RoomClient::join(&cfg).await {
        Ok(_) => panic!("join should fail"),
        Err(e) => e,
    };
    assert!(format!("{err:#}").contains("join rejected"), "{err:#}");

    server.abort();
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_grant_requests_all_succeed() -> anyhow::Result<()> {
    init_tracing();
    let (server, cfg) = spawn_server().await?;
    let room = RoomClient::join(&cfg).await?;
    let first = room.grant_requester();
    let second = room.grant_requester();

    let (a, b) = tokio::join!(first.fetch_grant(), second.fetch_grant());
    let (a, b) = (a?, b?);
    assert_eq!(a.identity, b.identity);
    assert_ne!(a.token, b.token);

    server.abort();
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn silent_connection_does_not_hold_up_the_room() -> anyhow::Result<()> {
    init_tracing();
    let (server, cfg) = spawn_server().await?;

    // Connected but never sends JoinRoom.
    let _idle = tokio::net::TcpStream::connect(cfg.server_addr.as_str()).await?;

    let quick = Duration::from_secs(1);
    let mut a = tokio::time::timeout(quick, join(&cfg, "alice"))
        .await
        .context("join stalled behind an idle handshake")??;
    let mut b = tokio::time::timeout(quick, join(&cfg, "bob"))
        .await
        .context("join stalled behind an idle handshake")??;
    let a_id = local_id(&a);

    let target = a
        .on_pointer_down(&PointerEvent::primary(Some(Vec3::new(5.0, 0.0, 6.0))))?
        .expect("primary click on a point must move")
        .payload;
    let started = tokio::time::Instant::now();
    assert!(
        wait_until(|| {
            a.frame();
            b.frame();
            b.registry().target(&a_id) == Some(target)
        })
        .await
    );
    assert!(started.elapsed() < quick, "move took {:?}", started.elapsed());

    server.abort();
    Ok(())
}

fn chrono_now() -> chrono::DateTime<chrono::Utc> {
    chrono::Utc::now()
}
