//! Tarea del historial de auditoría.
//!
//! Mantiene la bitácora rodante fusionada con la consulta de respaldo y la
//! publica por `watch`. Un registro nuevo entra primero a la memoria (queda
//! visible de inmediato) y recién después se persiste; si la persistencia
//! falla se registra el error y la copia local no se revierte.


use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};
use crate::context::domain::AppContext;
use crate::historial::domain::{crear_evento, filtrar, AccionHistorial, EventoHistorial,
                               FiltrosHistorial, RegistroHistorial};
use crate::roles::domain::{Capacidad, Sesion};
use crate::system::domain::historial_const::LIMITE;


fn publicar(tx: &watch::Sender<Vec<EventoHistorial>>, registro: &RegistroHistorial) {
    let _ = tx.send(registro.eventos().to_vec());
}


async fn cargar(registro: &mut RegistroHistorial,
                tx: &watch::Sender<Vec<EventoHistorial>>,
                ctx: &AppContext,
                limite: i64) {

    match ctx.repo.cargar_historial(limite).await {
        Ok(ascendente) => {
            registro.reemplazar_base(ascendente);
            publicar(tx, registro);
        }
        Err(e) => error!("Error cargando historial: {e}"),
    }
}


pub async fn run_historial(mut rx: mpsc::Receiver<AccionHistorial>,
                           tx_historial: watch::Sender<Vec<EventoHistorial>>,
                           rx_sesion: watch::Receiver<Sesion>,
                           app_context: AppContext) {

    info!("Info: historial task creada");

    let mut registro = RegistroHistorial::default();
    cargar(&mut registro, &tx_historial, &app_context, LIMITE).await;

    while let Some(accion) = rx.recv().await {
        match accion {
            AccionHistorial::Registrar { tipo, nombre, estado, correo_manual, rol_manual } => {
                let sesion = rx_sesion.borrow().clone();
                let correo = correo_manual.unwrap_or(sesion.correo);
                let rol = rol_manual.unwrap_or_else(|| sesion.rol.como_texto().to_string());

                let evento = crear_evento(&tipo, &nombre, estado, &correo, &rol,
                                          app_context.system.zona_horaria);

                // Visible en la bitácora antes de confirmar la escritura.
                registro.agregar(evento.clone());
                publicar(&tx_historial, &registro);

                if let Err(e) = app_context.repo.insertar_evento(&evento).await {
                    error!("Error registrando evento: {e}");
                }
            }

            AccionHistorial::Cargar { limite } => {
                if !rx_sesion.borrow().rol.permite(Capacidad::VerHistorial) {
                    warn!("Warning: rol sin acceso al historial, carga ignorada");
                    continue;
                }
                cargar(&mut registro, &tx_historial, &app_context, limite).await;
            }
        }
    }

    info!("Info: historial task finalizada");
}


pub fn start_historial(rx_from_estado: mpsc::Receiver<AccionHistorial>,
                       tx_historial: watch::Sender<Vec<EventoHistorial>>,
                       rx_sesion: watch::Receiver<Sesion>,
                       ctx: AppContext) {

    info!("Info: iniciando tarea historial");
    tokio::spawn(async move {
        run_historial(rx_from_estado,
                      tx_historial,
                      rx_sesion,
                      ctx).await;
    });
}


/// Superficie de consulta del historial: lo último publicado por la tarea,
/// con los criterios del operador aplicados al momento de leer.
pub struct VistaHistorial {
    rx: watch::Receiver<Vec<EventoHistorial>>,
    filtros: FiltrosHistorial,
}

impl VistaHistorial {
    pub fn new(rx: watch::Receiver<Vec<EventoHistorial>>) -> Self {
        Self { rx, filtros: FiltrosHistorial::default() }
    }

    pub fn aplicar_filtros(&mut self, filtros: FiltrosHistorial) {
        self.filtros = filtros;
    }

    /// Instantánea filtrada, más nueva primero.
    pub fn eventos(&mut self) -> Vec<EventoHistorial> {
        filtrar(&self.rx.borrow_and_update(), &self.filtros)
    }
}
