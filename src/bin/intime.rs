use std::time::{Duration, Instant};

use chrono::Local;
use clap::Parser;
use log::info;
use smithay_client_toolkit::reexports::{
    calloop::{
        EventLoop, Interest, LoopHandle, Mode, PostAction, generic::Generic, timer::TimeoutAction,
        timer::Timer,
    },
    calloop_wayland_source::WaylandSource,
};
use wayland_client::{Connection, globals};

use intime::app::ALARM_TICK;
use intime::{App, Cli, Config, Wayland, flock, ipc};

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let launch = cli.into_launch()?;

    let _lock = flock::try_acquire_host_lock()?;

    let mut config = Config::load();
    config.apply_overrides(&launch.overrides);

    let conn = Connection::connect_to_env()?;
    let (globals, event_queue) = globals::registry_queue_init(&conn)?;
    let qh = event_queue.handle();

    let wl = Wayland::new(&globals, &qh)?;
    let mut app = App::new(wl, config, launch);

    let mut event_loop = EventLoop::try_new()?;
    let loop_handle = event_loop.handle();

    WaylandSource::new(conn, event_queue).insert(loop_handle.clone())?;

    // Second tick, aligned to wall-clock second boundaries.
    let timer = Timer::from_duration(next_tick());
    loop_handle
        .insert_source(timer, |_, _, app: &mut App| {
            app.tick_second();
            TimeoutAction::ToDuration(next_tick())
        })
        .ok();

    // Sub-second animation, cadence depending on mode and style; drops
    // itself once neither applies (deadline reset back to a plain clock).
    if let Some(interval) = app.animation_interval() {
        let timer = Timer::from_duration(interval);
        loop_handle
            .insert_source(timer, |_, _, app: &mut App| {
                app.tick_animation();
                match app.animation_interval() {
                    Some(interval) => TimeoutAction::ToDuration(interval),
                    None => TimeoutAction::Drop,
                }
            })
            .ok();
    }

    // First screen sample fires immediately.
    if app.sampler_enabled() {
        insert_sampler_timer(&loop_handle, Duration::ZERO);
    }

    let ipc_listener = ipc::setup_listener()?;
    let event_source = Generic::new(ipc_listener, Interest::READ, Mode::Level);
    loop_handle.insert_source(event_source, move |readiness, listener, app: &mut App| {
        if readiness.readable
            && let Ok((stream, _)) = listener.accept()
        {
            ipc::serve_client(stream, |cmd| app.handle_command(cmd));
        }
        Ok(PostAction::Continue)
    })?;

    info!("overlay host running");

    loop {
        event_loop.dispatch(None, &mut app)?;

        if app.take_redraw_request() {
            app.draw_all();
        }

        // Drawing can raise the alarm (deadline reaching zero), so timer
        // requests are collected after it.
        if app.should_start_alarm_timer() {
            let timer = Timer::from_duration(ALARM_TICK);
            loop_handle
                .insert_source(timer, |_, _, app: &mut App| {
                    if app.tick_alarm() {
                        TimeoutAction::ToDuration(ALARM_TICK)
                    } else {
                        app.alarm_timer_stopped();
                        TimeoutAction::Drop
                    }
                })
                .ok();
        }

        if app.should_start_sampler_timer() {
            insert_sampler_timer(&loop_handle, Duration::ZERO);
        }

        if app.wl.exit {
            break;
        }
    }

    ipc::unlink_socket()?;
    info!("overlay host exiting");

    Ok(())
}

fn insert_sampler_timer(loop_handle: &LoopHandle<'_, App>, first: Duration) {
    let timer = Timer::from_duration(first);
    loop_handle
        .insert_source(timer, |_: Instant, _: &mut (), app: &mut App| {
            if app.tick_sampler() {
                match app.sampler_interval() {
                    Some(interval) => TimeoutAction::ToDuration(interval),
                    None => TimeoutAction::Drop,
                }
            } else {
                TimeoutAction::Drop
            }
        })
        .ok();
}

fn next_tick() -> Duration {
    let ms_since_last_sec = Local::now().timestamp_subsec_millis();
    Duration::from_millis((1000 - ms_since_last_sec) as u64)
}
