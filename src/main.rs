use std::sync::Arc;
use tracing::{error, info};
use crate::channels::domain::Channels;
use crate::conectividad::domain::start_watchdog;
use crate::conectividad::logic::start_sondeo;
use crate::context::domain::AppContext;
use crate::database::logic::start_limpieza;
use crate::estado::logic::{start_estado, start_monitor};
use crate::gateway::logic::{start_gateway, GatewayRtdb};
use crate::historial::domain::AccionHistorial;
use crate::historial::logic::{start_historial, VistaHistorial};
use crate::roles::logic::start_usuarios;
use crate::system::domain::{init_tracing, System};

mod channels;
mod conectividad;
mod context;
mod database;
mod estado;
mod gateway;
mod historial;
mod roles;
mod system;


#[tokio::main]
async fn main() {

    let system = match System::new() {
        Ok(system) => Arc::new(system),
        Err(e) => {
            eprintln!("Error: configuración inválida: {e}");
            return;
        }
    };

    init_tracing(&system);

    let channels = Channels::new();
    let app_context = AppContext::new(Arc::clone(&system)).await;

    let gateway = match GatewayRtdb::new(&system) {
        Ok(gateway) => gateway,
        Err(e) => {
            error!("Error: no se pudo crear el cliente del gateway: {e}");
            return;
        }
    };

    start_watchdog(channels.watchdog_to_sondeo,
                   channels.watchdog_from_sondeo);

    start_sondeo(channels.sondeo_to_watchdog,
                 channels.sondeo_from_watchdog,
                 channels.gateway_to_estado.clone(),
                 app_context.clone());

    start_gateway(channels.gateway_to_estado,
                  channels.gateway_from_estado,
                  gateway.clone());

    start_estado(channels.estado_from_gateway,
                 channels.estado_from_comandos,
                 channels.estado_tx,
                 channels.estado_to_gateway,
                 channels.estado_to_historial.clone(),
                 channels.sesion_rx.clone(),
                 gateway);

    start_historial(channels.historial_from_estado,
                    channels.historial_tx,
                    channels.sesion_rx,
                    app_context.clone());

    start_usuarios(channels.usuarios_from_comandos,
                   channels.sesion_tx,
                   channels.usuarios_tx,
                   channels.estado_to_historial.clone(),
                   app_context.clone());

    start_limpieza(app_context);

    start_monitor(channels.estado_rx);

    // Extremos de comando y vistas para el frente de consulta (API, consola).
    let _controles = (channels.comandos_to_estado, channels.comandos_to_usuarios);
    let _vistas = (channels.usuarios_rx, VistaHistorial::new(channels.historial_rx));

    info!("Info: servicio iniciado, esperando señal de apagado");

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Error: no se pudo escuchar la señal de apagado: {e}");
        return;
    }

    info!("Info: señal de apagado recibida");

    let cierre = AccionHistorial::Registrar {
        tipo: "Sesion".to_string(),
        nombre: "Sesión cerrada".to_string(),
        estado: true,
        correo_manual: Some(system.service_correo.clone()),
        rol_manual: None,
    };
    if channels.estado_to_historial.send(cierre).await.is_err() {
        error!("Error: no se pudo registrar el cierre de sesión");
    }

    // Margen para que el historial persista el evento de cierre.
    tokio::time::sleep(std::time::Duration::from_millis(300)).await;
}
