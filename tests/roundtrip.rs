//! End-to-end sessions driven through `block_on` with a scripted reactor.

use std::{cell::Cell, cell::RefCell, convert::Infallible, rc::Rc};

use wakebridge::{
    remote,
    sim::{SimRemote, SimSocket},
    AsyncSocket, EventHub, EventKind, Executor, SocketState, Timeout, WaitResult, Watched,
};

fn run<F>(hub: &Rc<EventHub>, socket: &Watched<SimSocket>, script: &[Step], future: F) -> F::Output
where
    F: std::future::IntoFuture,
{
    let step = Cell::new(0_usize);
    let result = wakebridge::block_on(future, || {
        if let Some(action) = script.get(step.get()) {
            apply(socket, action);
        }
        step.set(step.get() + 1);
        assert!(step.get() < script.len() + 16, "script exhausted");

        hub.tick();
        Ok::<_, Infallible>(())
    });

    match result {
        Ok(output) => output,
        Err(never) => match never {},
    }
}

enum Step {
    State(SocketState),
    Feed(&'static [u8]),
    Flush,
    Disconnect,
    Nothing,
}

fn apply(socket: &Watched<SimSocket>, step: &Step) {
    match *step {
        Step::State(state) => {
            socket.with(|inner| inner.set_state(state));
            socket.emit(EventKind::StateChanged);
        }
        Step::Feed(data) => {
            socket.with(|inner| inner.feed(data));
            socket.emit(EventKind::ReadyRead);
        }
        Step::Flush => {
            socket.with(|inner| {
                inner.flush();
            });
            socket.emit(EventKind::BytesWritten);
        }
        Step::Disconnect => {
            socket.with(|inner| inner.set_state(SocketState::Unconnected));
            socket.emit(EventKind::Disconnected);
        }
        Step::Nothing => {}
    }
}

fn new_socket(hub: &Rc<EventHub>, state: SocketState) -> Watched<SimSocket> {
    let socket = Watched::new(hub.clone(), SimSocket::new());
    socket.with(|inner| inner.set_state(state));
    socket
}

#[test]
fn immediate_and_staged_connects_are_observably_identical() {
    // connect against a reactor that is already connected
    let hub = Rc::new(EventHub::new());
    let socket = new_socket(&hub, SocketState::Connected);
    let adapter = AsyncSocket::new(&socket);
    let fast: WaitResult<()> = run(
        &hub,
        &socket,
        &[],
        adapter.wait_for_connected(Timeout::DEFAULT),
    );

    // connect against a reactor that goes through Connecting first
    let hub = Rc::new(EventHub::new());
    let socket = new_socket(&hub, SocketState::Unconnected);
    let adapter = AsyncSocket::new(&socket);
    let staged: WaitResult<()> = run(
        &hub,
        &socket,
        &[
            Step::State(SocketState::Connecting),
            Step::State(SocketState::Connected),
        ],
        adapter.connect_to_server(Timeout::DEFAULT),
    );

    assert_eq!(fast, staged);
}

#[test]
fn connect_write_read_session_completes() {
    let hub = Rc::new(EventHub::new());
    let socket = new_socket(&hub, SocketState::Unconnected);
    let adapter = AsyncSocket::new(&socket);
    let io = adapter.io();

    let session = async {
        adapter.connect_to_server(Timeout::DEFAULT).await?;
        let written = io.write(b"hello\n", Timeout::DEFAULT).await?;
        let line = io.read_line(Timeout::DEFAULT).await?;
        Ok::<_, wakebridge::WaitError>((written, line))
    };

    let (written, line) = run(
        &hub,
        &socket,
        &[
            Step::State(SocketState::Connecting),
            Step::State(SocketState::Connected),
            Step::Flush,
            Step::Feed(b"world\n"),
        ],
        session,
    )
    .expect("session should succeed");

    assert_eq!(written, 6);
    assert_eq!(line, b"world\n".to_vec());
    assert_eq!(hub.active_subscriptions(), 0);
    assert_eq!(hub.active_timers(), 0);
}

#[test]
fn read_interrupted_by_disconnect_reports_the_failure() {
    let hub = Rc::new(EventHub::new());
    let socket = new_socket(&hub, SocketState::Connected);
    let adapter = AsyncSocket::new(&socket);
    let io = adapter.io();

    let result: WaitResult<Vec<u8>> = run(
        &hub,
        &socket,
        &[Step::Nothing, Step::Disconnect],
        io.read_all(Timeout::DEFAULT),
    );

    assert_eq!(result, Err(wakebridge::WaitError::ConnectionClosed));
    assert_eq!(hub.active_subscriptions(), 0);
}

#[test]
fn remote_round_trip_through_the_executor() {
    let hub = Rc::new(EventHub::new());
    let executor = Rc::new(Executor::new());
    let remote_iface = Rc::new(RefCell::new(SimRemote::new(hub.clone())));
    remote_iface
        .borrow_mut()
        .respond_later("ping", Ok("pong".into()));
    remote_iface
        .borrow_mut()
        .respond_immediately("cached", Ok("hit".into()));

    let iface = remote_iface.clone();
    let task = executor.spawn(async move {
        // short-circuit: finished before anyone waited
        let cached = remote::call(&mut *iface.borrow_mut(), "cached".into(), Timeout::DEFAULT)
            .await?;

        let pending = remote::call(&mut *iface.borrow_mut(), "ping".into(), Timeout::DEFAULT);
        let answer = pending.await?;
        Ok::<_, wakebridge::WaitError>((cached, answer))
    });

    let turns = Cell::new(0_u32);
    let result = wakebridge::block_on(task, || {
        executor.tick();
        remote_iface.borrow_mut().deliver();
        hub.tick();

        turns.set(turns.get() + 1);
        assert!(turns.get() < 16, "remote session stalled");
        Ok::<_, Infallible>(())
    });

    let output = match result {
        Ok(output) => output,
        Err(never) => match never {},
    };
    let (cached, answer) = output.expect("calls should succeed");
    assert_eq!(cached, "hit");
    assert_eq!(answer, "pong");
    assert_eq!(hub.active_subscriptions(), 0);
}
