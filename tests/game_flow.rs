//! End-to-end flow: chain events materialize a game, the lobby adjudicates a
//! full mate, and settlement is handed off exactly once.

use ethers::contract::LogMeta;
use ethers::types::{Address, H256, U256, U64};
use tokio::sync::mpsc;

use gambit_backend::chain::escrow::{GameCreatedFilter, GameJoinedFilter};
use gambit_backend::chess::{Color, Square};
use gambit_backend::lobby::{Lobby, SettlementJob};
use gambit_backend::models::GameLifecycle;
use gambit_backend::poller::{creation_event, join_event};

const CHAIN_ID: u64 = 11_155_111;

fn addr(byte: u8) -> Address {
    Address::from([byte; 20])
}

fn meta(block: u64) -> LogMeta {
    LogMeta {
        address: addr(0xcc),
        block_number: U64::from(block),
        block_hash: H256::from([0x0b; 32]),
        transaction_hash: H256::from([0x0a; 32]),
        transaction_index: U64::zero(),
        log_index: U256::zero(),
    }
}

fn created(game_id: &str, creator: Address) -> GameCreatedFilter {
    GameCreatedFilter {
        game_id: game_id.to_string(),
        game_id_hash: [0u8; 32],
        creator,
        wager_amount: U256::exp10(16),
    }
}

fn joined(game_id: &str, joiner: Address) -> GameJoinedFilter {
    GameJoinedFilter {
        game_id: game_id.to_string(),
        game_id_hash: [0u8; 32],
        joiner,
        wager_amount: U256::exp10(16),
    }
}

fn sq(row: usize, col: usize) -> Square {
    Square::new(row, col)
}

#[tokio::test]
async fn wagered_game_runs_from_chain_events_to_settlement_handoff() {
    let lobby = Lobby::new();
    let white = addr(0xaa);
    let black = addr(0xbb);

    // Window 1: creation observed. Window 2: the same range is retried (the
    // poller re-delivers) and the join arrives.
    lobby
        .upsert_from_creation(creation_event(
            created("match-1", white),
            &meta(100),
            CHAIN_ID,
            None,
        ))
        .await;
    lobby
        .upsert_from_creation(creation_event(
            created("match-1", white),
            &meta(100),
            CHAIN_ID,
            None,
        ))
        .await;
    lobby.apply_join(join_event(joined("match-1", black))).await;
    lobby.apply_join(join_event(joined("match-1", black))).await;

    let game = lobby.get_game("match-1").await.unwrap();
    assert_eq!(game.state, GameLifecycle::Started);
    assert_eq!(game.opponent, Some(black));
    let escrow = game.escrow.as_ref().unwrap();
    assert_eq!(escrow.creation_block, 100);
    assert!(escrow.settlement_tx_hash.is_none());
    assert!(game.chess.is_some());

    // Fool's mate; the final move is the only one that yields a job.
    let (handoff, mut jobs) = mpsc::unbounded_channel::<SettlementJob>();
    let script = [
        ((6, 5), (5, 5), white),
        ((1, 4), (3, 4), black),
        ((6, 6), (4, 6), white),
        ((0, 3), (4, 7), black),
    ];
    for (from, to, mover) in script {
        let applied = lobby
            .make_move(
                "match-1",
                sq(from.0, from.1),
                sq(to.0, to.1),
                None,
                mover,
            )
            .await
            .unwrap();
        if let Some(job) = applied.settlement {
            handoff.send(job).unwrap();
        }
    }

    let job = jobs.try_recv().unwrap();
    assert_eq!(job.game_id, "match-1");
    assert_eq!(job.winner, black);
    assert_eq!(job.chain_id, CHAIN_ID);
    assert!(jobs.try_recv().is_err());

    // The settler reports back its transaction hash.
    lobby
        .record_settlement_tx("match-1", format!("{:?}", H256::from([9u8; 32])))
        .await;

    let settled = lobby.get_game("match-1").await.unwrap();
    assert_eq!(settled.state, GameLifecycle::Settled);
    assert_eq!(settled.winner, Some(Color::Black));
    assert!(settled.settled_at.is_some());
    assert!(settled
        .escrow
        .unwrap()
        .settlement_tx_hash
        .unwrap()
        .starts_with("0x"));

    assert_eq!(lobby.list_settled(white).await.len(), 1);
    assert_eq!(lobby.list_settled(black).await.len(), 1);
    assert!(lobby.list_active(white).await.is_empty());
}

#[tokio::test]
async fn invitation_flow_only_lists_for_named_opponent() {
    let lobby = Lobby::new();
    let creator = addr(0x11);
    let invited = addr(0x22);
    let stranger = addr(0x33);

    lobby
        .upsert_from_creation(creation_event(
            created("invite-1", creator),
            &meta(7),
            CHAIN_ID,
            Some(invited),
        ))
        .await;

    assert_eq!(lobby.list_invitations(invited).await.len(), 1);
    assert!(lobby.list_invitations(stranger).await.is_empty());
    assert!(lobby.list_open(None).await.is_empty());

    lobby
        .apply_join(join_event(joined("invite-1", invited)))
        .await;
    let game = lobby.get_game("invite-1").await.unwrap();
    assert_eq!(game.state, GameLifecycle::Started);
    assert_eq!(game.opponent, Some(invited));
}
