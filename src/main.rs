use std::{
    cell::{Cell, RefCell},
    convert::Infallible,
    rc::Rc,
};

use wakebridge::{
    remote,
    sim::{SimRemote, SimSocket},
    AsyncSocket, EventHub, EventKind, Executor, SocketState, Timeout, Watched,
};

/// Scripted session against the simulated reactor: connect, write a line,
/// read the reply, then round-trip a remote call.
fn main() {
    let hub = Rc::new(EventHub::new());
    let executor = Rc::new(Executor::new());

    let socket = Watched::new(hub.clone(), SimSocket::new());
    let remote_iface = Rc::new(RefCell::new(SimRemote::new(hub.clone())));
    remote_iface
        .borrow_mut()
        .respond_later("ping", Ok("pong".into()));

    let adapter = AsyncSocket::new(&socket);
    let io = adapter.io();
    let iface = remote_iface.clone();

    let task = executor.spawn(async move {
        adapter.connect_to_server(Timeout::DEFAULT).await?;
        println!("connected");

        let written = io.write(b"hello\n", Timeout::DEFAULT).await?;
        println!("flushed {written} bytes");

        let line = io.read_line(Timeout::DEFAULT).await?;
        println!("received {:?}", String::from_utf8_lossy(&line));

        let pending = remote::call(
            &mut *iface.borrow_mut(),
            "ping".to_owned(),
            Timeout::DEFAULT,
        );
        let answer = pending.await?;
        println!("remote answered {answer:?}");

        Ok::<(), wakebridge::WaitError>(())
    });

    // the reactor's role, one observable effect per turn
    let step = Cell::new(0_u32);
    let outcome = wakebridge::block_on(task, || {
        executor.tick();

        match step.get() {
            0 => {
                socket.with(|inner| inner.set_state(SocketState::Connecting));
                socket.emit(EventKind::StateChanged);
            }
            1 => {
                socket.with(|inner| inner.set_state(SocketState::Connected));
                socket.emit(EventKind::StateChanged);
            }
            2 => {
                let flushed = socket.with(SimSocket::flush);
                println!("reactor flushed {:?}", String::from_utf8_lossy(&flushed));
                socket.emit(EventKind::BytesWritten);
            }
            3 => {
                socket.with(|inner| inner.feed(b"world\n"));
                socket.emit(EventKind::ReadyRead);
            }
            _ => remote_iface.borrow_mut().deliver(),
        }
        step.set(step.get() + 1);

        hub.tick();
        Ok::<_, Infallible>(())
    })
    .unwrap();

    match outcome {
        Ok(()) => println!("session complete"),
        Err(error) => eprintln!("session failed: {error}"),
    }
}
