//! Sondeo de conectividad a internet.
//!
//! Este módulo implementa el observador de alcance de red a nivel
//! dispositivo, independiente del estado de conexión con el backend.
//!
//! # Arquitectura de Actores
//! Funciona en coordinación con una tarea de temporización (Watchdog/Timer):
//! 1. Esta tarea solicita un temporizador (`TimerEvent::InitTimer`).
//! 2. La tarea de temporización espera y responde con `TimerEvent::Timeout`.
//! 3. Esta tarea reacciona al timeout sondeando la URL de prueba, emite el
//!    resultado hacia el agregador y reinicia el ciclo.


use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument};
use crate::conectividad::domain::TimerEvent;
use crate::context::domain::AppContext;
use crate::estado::domain::Actualizacion;
use crate::system::domain::gateway_const::TIMEOUT_SECS;


async fn sondear(cliente: &reqwest::Client, url: &str) -> bool {
    cliente.head(url)
        .send()
        .await
        .map(|respuesta| respuesta.status().is_success())
        .unwrap_or(false)
}


/// Ejecuta el bucle de sondeo de internet.
///
/// Emite una primera medición al arrancar y luego una por cada ciclo del
/// watchdog. Cada medición viaja como `Actualizacion::Internet` hacia el
/// agregador, que la combina en la instantánea.
///
/// # Argumentos
/// * `tx_timer`: Canal para enviar comandos al Watchdog (iniciar timers).
/// * `rx_from_watchdog`: Canal para recibir notificaciones de tiempo cumplido (`Timeout`).
/// * `tx_estado`: Canal hacia la tarea del agregador de estado.
/// * `app_context`: Configuración global (URL de sondeo e intervalo).
#[instrument(
    name = "run_sondeo_task",
    skip(tx_timer, rx_from_watchdog, tx_estado, app_context)
)]
pub async fn run_sondeo(tx_timer: mpsc::Sender<TimerEvent>,
                        mut rx_from_watchdog: mpsc::Receiver<TimerEvent>,
                        tx_estado: mpsc::Sender<Actualizacion>,
                        app_context: AppContext) {

    info!("Info: sondeo task creada");

    let cliente = match reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(TIMEOUT_SECS))
        .build() {
        Ok(cliente) => cliente,
        Err(e) => {
            error!("Error: no se pudo crear el cliente de sondeo: {e}");
            return;
        }
    };

    let intervalo = Duration::from_secs(app_context.system.sondeo_interval_secs);

    let en_linea = sondear(&cliente, &app_context.system.probe_url).await;
    if tx_estado.send(Actualizacion::Internet(en_linea)).await.is_err() {
        error!("Error: no se pudo enviar el estado de internet");
    }
    if tx_timer.send(TimerEvent::InitTimer(intervalo)).await.is_err() {
        error!("Error: no se pudo enviar el evento al watchdog");
    }

    while let Some(evento) = rx_from_watchdog.recv().await {
        debug!("Debug: evento entrante del watchdog");
        match evento {
            TimerEvent::Timeout => {
                let en_linea = sondear(&cliente, &app_context.system.probe_url).await;
                if tx_estado.send(Actualizacion::Internet(en_linea)).await.is_err() {
                    error!("Error: no se pudo enviar el estado de internet");
                }
                if tx_timer.send(TimerEvent::InitTimer(intervalo)).await.is_err() {
                    error!("Error: no se pudo enviar el evento al watchdog");
                }
            }
            _ => {}
        }
    }
    info!("Info: sondeo task finalizada");
}


/// Inicializa y ejecuta la tarea de sondeo en segundo plano (tokio task).
pub fn start_sondeo(to_watchdog: mpsc::Sender<TimerEvent>,
                    from_watchdog: mpsc::Receiver<TimerEvent>,
                    to_estado: mpsc::Sender<Actualizacion>,
                    ctx: AppContext) {

    info!("Info: iniciando tarea sondeo");
    tokio::spawn(async move {
        run_sondeo(
            to_watchdog,
            from_watchdog,
            to_estado,
            ctx,
        ).await;
    });
}
